use crate::bucket::{key_variants, PolicyBucket};
use crate::checksum::ChecksumValidator;
use crate::error::{StorageError, StorageResult};
use crate::integrity::Integrity;
use crate::interner::Interner;
use crate::serialize;
use hashbrown::{HashMap, HashSet};
use slog::{debug, info, o, Logger};
use std::fs;
use std::path::{Path, PathBuf};
use warden_core::paths::{BUCKET_FILENAME_PREFIX, CHECKSUM_FILENAME, INDEX_FILENAME};
use warden_core::types::ROOT_BUCKET;
use warden_core::{BucketId, Policy, PolicyKey, PolicyResult, PolicyType};

fn bucket_filename(id: &str) -> String {
    format!("{}{}", BUCKET_FILENAME_PREFIX, id)
}

/// The in-memory database: bucket map, interning table, and the on-disk
/// representation underneath `db_path`.
pub struct Database {
    buckets: HashMap<BucketId, PolicyBucket>,
    interner: Interner,
    integrity: Integrity,
    log: Logger,
}

impl Database {
    pub fn new<P: Into<PathBuf>>(db_path: P, log: &Logger) -> Database {
        let log = log.new(o!("module" => "storage"));
        let mut database = Database {
            buckets: HashMap::new(),
            interner: Interner::new(),
            integrity: Integrity::new(db_path, log.clone()),
            log,
        };
        database.reset_to_default();
        database
    }

    /// Empty database: just the root bucket, defaulting to DENY.
    fn reset_to_default(&mut self) {
        self.buckets.clear();
        self.interner = Interner::new();
        self.buckets.insert(
            BucketId::from(ROOT_BUCKET),
            PolicyBucket::new(
                BucketId::from(ROOT_BUCKET),
                PolicyResult::from(PolicyType::DENY),
            ),
        );
    }

    #[inline]
    pub fn has_bucket(&self, id: &BucketId) -> bool {
        self.buckets.contains_key(id)
    }

    #[inline]
    pub fn bucket(&self, id: &BucketId) -> Option<&PolicyBucket> {
        self.buckets.get(id)
    }

    pub fn bucket_ids(&self) -> Vec<BucketId> {
        self.buckets.keys().cloned().collect()
    }

    pub fn create_bucket(&mut self, id: BucketId, default: PolicyResult) {
        let id = self.interner.intern(id);
        let default = self.interner.intern_result(default);
        self.buckets
            .insert(id.clone(), PolicyBucket::new(id, default));
    }

    pub fn update_bucket(&mut self, id: &BucketId, default: PolicyResult) -> StorageResult<()> {
        let default = self.interner.intern_result(default);
        self.buckets
            .get_mut(id)
            .map(|bucket| bucket.set_default(default))
            .ok_or_else(|| StorageError::BucketNotFound(id.clone()))
    }

    pub fn delete_bucket(&mut self, id: &BucketId) -> StorageResult<()> {
        self.buckets
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::BucketNotFound(id.clone()))
    }

    /// Remove every policy redirecting into the given bucket, wherever it
    /// lives. Run before the bucket itself goes away.
    pub fn delete_linking(&mut self, id: &BucketId) {
        for bucket in self.buckets.values_mut() {
            let doomed: Vec<PolicyKey> = bucket
                .iter()
                .filter(|policy| {
                    policy.result.policy_type() == PolicyType::BUCKET
                        && policy.result.metadata() == id
                })
                .map(|policy| policy.key)
                .collect();

            for key in doomed {
                bucket.remove(&key);
            }
        }
    }

    pub fn insert_policy(&mut self, bucket_id: &BucketId, policy: Policy) -> StorageResult<()> {
        let key = self.interner.intern_key(policy.key);
        let result = self.interner.intern_result(policy.result);

        self.buckets
            .get_mut(bucket_id)
            .map(|bucket| bucket.insert(Policy::new(key, result)))
            .ok_or_else(|| StorageError::BucketNotFound(bucket_id.clone()))
    }

    /// Remove by exact key; absent keys are a no-op.
    pub fn delete_policy(&mut self, bucket_id: &BucketId, key: &PolicyKey) -> StorageResult<()> {
        self.buckets
            .get_mut(bucket_id)
            .map(|bucket| {
                bucket.remove(key);
            })
            .ok_or_else(|| StorageError::BucketNotFound(bucket_id.clone()))
    }

    /// All stored policies a literal query key can match in one bucket: the
    /// eight wildcard variants of the key, looked up exactly.
    pub fn search(&self, bucket_id: &BucketId, key: &PolicyKey) -> Vec<Policy> {
        match self.buckets.get(bucket_id) {
            Some(bucket) => key_variants(key)
                .iter()
                .filter_map(|variant| {
                    bucket
                        .get(variant)
                        .map(|result| Policy::new(variant.clone(), result.clone()))
                })
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn list_policies(
        &self,
        bucket_id: &BucketId,
        filter: &PolicyKey,
    ) -> StorageResult<Vec<Policy>> {
        self.buckets
            .get(bucket_id)
            .map(|bucket| bucket.list(filter))
            .ok_or_else(|| StorageError::BucketNotFound(bucket_id.clone()))
    }

    pub fn erase_policies(
        &mut self,
        start_bucket: &BucketId,
        recursive: bool,
        filter: &PolicyKey,
    ) -> StorageResult<()> {
        if !self.has_bucket(start_bucket) {
            return Err(StorageError::BucketNotFound(start_bucket.clone()));
        }

        let mut visited = HashSet::new();
        self.erase_from(start_bucket.clone(), recursive, filter, &mut visited);
        Ok(())
    }

    fn erase_from(
        &mut self,
        bucket_id: BucketId,
        recursive: bool,
        filter: &PolicyKey,
        visited: &mut HashSet<BucketId>,
    ) {
        if !visited.insert(bucket_id.clone()) {
            return;
        }

        // Links are collected before erasure removes them.
        let links: Vec<BucketId> = if recursive {
            self.buckets
                .get(&bucket_id)
                .map(|bucket| {
                    bucket
                        .list(filter)
                        .into_iter()
                        .filter(|policy| policy.result.policy_type() == PolicyType::BUCKET)
                        .map(|policy| policy.result.metadata().clone())
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if let Some(bucket) = self.buckets.get_mut(&bucket_id) {
            let erased = bucket.erase(filter);
            debug!(self.log, "policies erased";
                   "bucket" => %bucket_id, "count" => erased);
        }

        for link in links {
            if self.has_bucket(&link) {
                self.erase_from(link, recursive, filter, visited);
            }
        }
    }

    pub fn db_path(&self) -> &Path {
        self.integrity.db_path()
    }

    /// Persist the database: complete backup set, checksum book, guard,
    /// swap, guard removal, stray-file cleanup. Interruption at any point
    /// leaves either the previous or the new state loadable.
    pub fn save(&mut self) -> StorageResult<()> {
        fs::create_dir_all(self.integrity.db_path())?;

        let mut validator = ChecksumValidator::new();
        let mut filenames: Vec<String> = Vec::with_capacity(self.buckets.len() + 2);

        let mut ids = self.bucket_ids();
        ids.sort();

        let index_content = serialize::dump_index(
            ids.iter().map(|id| &self.buckets[id]),
        );
        validator.record(INDEX_FILENAME, index_content.as_bytes());
        self.integrity
            .write_backup(INDEX_FILENAME, index_content.as_bytes())?;
        filenames.push(INDEX_FILENAME.to_string());

        for id in &ids {
            let filename = bucket_filename(id);
            let content = serialize::dump_bucket(&self.buckets[id]);
            validator.record(&filename, content.as_bytes());
            self.integrity.write_backup(&filename, content.as_bytes())?;
            filenames.push(filename);
        }

        let checksum_content = validator.dump();
        self.integrity
            .write_backup(CHECKSUM_FILENAME, checksum_content.as_bytes())?;
        filenames.push(CHECKSUM_FILENAME.to_string());

        self.integrity.sync_dir()?;
        self.integrity.create_backup_guard()?;
        self.integrity.promote_backups(&filenames)?;
        self.integrity.remove_backup_guard()?;

        let index: HashSet<String> = ids.iter().map(|id| id.to_string()).collect();
        self.integrity
            .delete_non_indexed(|id| index.contains(id))?;

        self.interner.prune();

        info!(self.log, "database saved";
              "buckets" => ids.len(), "path" => %self.integrity.db_path().display());
        Ok(())
    }

    /// Load the database from disk, honoring the guard file. A missing
    /// database (no index, no guard) bootstraps the default state.
    pub fn load(&mut self) -> StorageResult<()> {
        let prefer_backup = self.integrity.backup_guard_exists();

        if !prefer_backup && !self.integrity.primary(INDEX_FILENAME).exists() {
            info!(self.log, "no database found, bootstrapping defaults";
                  "path" => %self.integrity.db_path().display());
            self.reset_to_default();
            return self.save();
        }

        let checksum_content =
            read_db_file(&self.integrity.select(CHECKSUM_FILENAME, prefer_backup))?;
        let validator = ChecksumValidator::load(&checksum_content)?;

        let index_content = read_db_file(&self.integrity.select(INDEX_FILENAME, prefer_backup))?;
        validator.compare(INDEX_FILENAME, index_content.as_bytes())?;
        let index = serialize::parse_index(&index_content, INDEX_FILENAME)?;

        self.buckets.clear();
        self.interner = Interner::new();

        let mut filenames = vec![INDEX_FILENAME.to_string(), CHECKSUM_FILENAME.to_string()];

        for (id, default) in index {
            let filename = bucket_filename(&id);
            let content = read_db_file(&self.integrity.select(&filename, prefer_backup))?;
            validator.compare(&filename, content.as_bytes())?;

            let policies = serialize::parse_bucket(&content, &filename)?;

            self.create_bucket(id.clone(), default);
            for policy in policies {
                self.insert_policy(&id, policy)?;
            }

            filenames.push(filename);
        }

        if !self.has_bucket(&BucketId::from(ROOT_BUCKET)) {
            return Err(StorageError::DatabaseCorrupted(
                "index does not name the root bucket".to_string(),
            ));
        }

        if prefer_backup {
            // Finish the interrupted swap now that the new state is in.
            self.integrity.promote_backups(&filenames)?;
            self.integrity.remove_backup_guard()?;
        }

        let index: HashSet<String> = self
            .buckets
            .keys()
            .map(|id| id.to_string())
            .collect();
        self.integrity
            .delete_non_indexed(|id| index.contains(id))?;

        info!(self.log, "database loaded";
              "buckets" => self.buckets.len(), "from_backup" => prefer_backup);
        Ok(())
    }
}

fn read_db_file(path: &Path) -> StorageResult<String> {
    fs::read_to_string(path).map_err(|_| {
        StorageError::DatabaseCorrupted(format!("missing or unreadable file {}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use warden_core::logging;
    use warden_core::paths::GUARD_FILENAME;
    use warden_core::types::ANY;

    fn new_db(dir: &Path) -> Database {
        Database::new(dir, &logging::discard())
    }

    fn populate(db: &mut Database, tag: &str) {
        db.create_bucket(
            BucketId::from("extra"),
            PolicyResult::from(PolicyType::ALLOW),
        );
        db.create_bucket(
            BucketId::from("other"),
            PolicyResult::from(PolicyType::NONE),
        );

        for i in 0..50 {
            db.insert_policy(
                &BucketId::from(ROOT_BUCKET),
                Policy::new(
                    PolicyKey::new(format!("client-{}-{}", tag, i), "user", "priv"),
                    PolicyResult::from(PolicyType::ALLOW),
                ),
            )
            .unwrap();
        }
        db.insert_policy(
            &BucketId::from("extra"),
            Policy::new(
                PolicyKey::new("c", "u", "*"),
                PolicyResult::new(PolicyType::BUCKET, "other"),
            ),
        )
        .unwrap();
    }

    /// Sorted structural view of a database, for equality assertions.
    fn snapshot(db: &Database) -> Vec<(String, PolicyResult, Vec<Policy>)> {
        let mut ids = db.bucket_ids();
        ids.sort();

        ids.into_iter()
            .map(|id| {
                let bucket = db.bucket(&id).unwrap();
                let mut policies =
                    bucket.list(&PolicyKey::new(ANY, ANY, ANY));
                policies.sort_by(|a, b| {
                    (&a.key.client, &a.key.user, &a.key.privilege).cmp(&(
                        &b.key.client,
                        &b.key.user,
                        &b.key.privilege,
                    ))
                });
                (id.to_string(), bucket.default().clone(), policies)
            })
            .collect()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let mut db = new_db(dir.path());
        populate(&mut db, "a");
        db.save().unwrap();

        let before = snapshot(&db);

        let mut reloaded = new_db(dir.path());
        reloaded.load().unwrap();

        assert_eq!(snapshot(&reloaded), before);
        assert!(!dir.path().join(GUARD_FILENAME).exists());
    }

    #[test]
    fn test_load_bootstraps_missing_database() {
        let dir = tempfile::tempdir().unwrap();

        let mut db = new_db(&dir.path().join("db"));
        db.load().unwrap();

        assert!(db.has_bucket(&BucketId::from(ROOT_BUCKET)));
        assert!(dir.path().join("db").join(INDEX_FILENAME).exists());
        assert!(dir.path().join("db").join(CHECKSUM_FILENAME).exists());
    }

    #[test]
    fn test_load_detects_tampered_bucket_file() {
        let dir = tempfile::tempdir().unwrap();

        let mut db = new_db(dir.path());
        populate(&mut db, "a");
        db.save().unwrap();

        fs::write(dir.path().join("_extra"), "c;u;p;0x2;\n").unwrap();

        let mut reloaded = new_db(dir.path());
        assert!(matches!(
            reloaded.load(),
            Err(StorageError::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn test_load_detects_missing_indexed_bucket_file() {
        let dir = tempfile::tempdir().unwrap();

        let mut db = new_db(dir.path());
        populate(&mut db, "a");
        db.save().unwrap();

        fs::remove_file(dir.path().join("_extra")).unwrap();

        let mut reloaded = new_db(dir.path());
        assert!(matches!(
            reloaded.load(),
            Err(StorageError::DatabaseCorrupted(_))
        ));
    }

    /// Copy the primary file set of `from` into `to` as `~` backups,
    /// mimicking a save that was interrupted before the swap.
    fn plant_backup_set(from: &Path, to: &Path) {
        for entry in fs::read_dir(from).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().into_string().unwrap();
            fs::copy(entry.path(), to.join(format!("{}~", name))).unwrap();
        }
    }

    #[test]
    fn test_crash_before_guard_keeps_old_state() {
        let old_dir = tempfile::tempdir().unwrap();
        let new_dir = tempfile::tempdir().unwrap();

        let mut old_db = new_db(old_dir.path());
        populate(&mut old_db, "old");
        old_db.save().unwrap();
        let old_state = snapshot(&old_db);

        let mut new_db_state = new_db(new_dir.path());
        populate(&mut new_db_state, "new");
        new_db_state.save().unwrap();

        // Full new backup set on disk, but the crash hit before the guard
        // was created: the primaries win.
        plant_backup_set(new_dir.path(), old_dir.path());

        let mut reloaded = new_db(old_dir.path());
        reloaded.load().unwrap();

        assert_eq!(snapshot(&reloaded), old_state);
        // Repair removed the stale backups.
        assert!(!old_dir.path().join("buckets~").exists());
    }

    #[test]
    fn test_crash_after_guard_promotes_new_state() {
        let old_dir = tempfile::tempdir().unwrap();
        let new_dir = tempfile::tempdir().unwrap();

        let mut old_db = new_db(old_dir.path());
        populate(&mut old_db, "old");
        old_db.save().unwrap();

        let mut new_state = new_db(new_dir.path());
        populate(&mut new_state, "new");
        new_state.save().unwrap();
        let expected = snapshot(&new_state);

        plant_backup_set(new_dir.path(), old_dir.path());
        fs::write(old_dir.path().join(GUARD_FILENAME), b"").unwrap();

        let mut reloaded = new_db(old_dir.path());
        reloaded.load().unwrap();

        assert_eq!(snapshot(&reloaded), expected);
        // The interrupted swap was finished: guard and backups are gone
        // and the primaries now carry the new state.
        assert!(!old_dir.path().join(GUARD_FILENAME).exists());
        assert!(!old_dir.path().join("buckets~").exists());

        let mut again = new_db(old_dir.path());
        again.load().unwrap();
        assert_eq!(snapshot(&again), expected);
    }

    #[test]
    fn test_crash_mid_swap_promotes_new_state() {
        let old_dir = tempfile::tempdir().unwrap();
        let new_dir = tempfile::tempdir().unwrap();

        let mut old_db = new_db(old_dir.path());
        populate(&mut old_db, "old");
        old_db.save().unwrap();

        let mut new_state = new_db(new_dir.path());
        populate(&mut new_state, "new");
        new_state.save().unwrap();
        let expected = snapshot(&new_state);

        plant_backup_set(new_dir.path(), old_dir.path());
        fs::write(old_dir.path().join(GUARD_FILENAME), b"").unwrap();

        // Half the renames already happened before the crash.
        fs::rename(
            old_dir.path().join("buckets~"),
            old_dir.path().join("buckets"),
        )
        .unwrap();
        fs::rename(old_dir.path().join("_~"), old_dir.path().join("_")).unwrap();

        let mut reloaded = new_db(old_dir.path());
        reloaded.load().unwrap();

        assert_eq!(snapshot(&reloaded), expected);
    }

    #[test]
    fn test_save_removes_files_of_deleted_buckets() {
        let dir = tempfile::tempdir().unwrap();

        let mut db = new_db(dir.path());
        populate(&mut db, "a");
        db.save().unwrap();
        assert!(dir.path().join("_extra").exists());

        db.delete_linking(&BucketId::from("extra"));
        db.delete_bucket(&BucketId::from("extra")).unwrap();
        db.save().unwrap();

        assert!(!dir.path().join("_extra").exists());
        assert!(dir.path().join("_other").exists());
    }
}
