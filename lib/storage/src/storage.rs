use crate::backend::Database;
use crate::error::{StorageError, StorageResult};
use hashbrown::HashSet;
use warden_core::types::ROOT_BUCKET;
use warden_core::{BucketId, Policy, PolicyKey, PolicyResult, PolicyType};

/// Validated front of the policy database. Owns the backend and implements
/// the minimal-result evaluation over it.
pub struct Storage {
    db: Database,
}

impl Storage {
    pub fn new(db: Database) -> Storage {
        Storage { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Evaluate a key against a bucket. The result is the minimum of the
    /// matching policies under `DENY < NONE < ALLOW < plugin types`, the
    /// bucket default when nothing matches. DENY short-circuits; BUCKET
    /// policies redirect when `recursive` and are cycle-cut by a visited
    /// set scoped to this call.
    pub fn check_policy(
        &self,
        key: &PolicyKey,
        start_bucket: &BucketId,
        recursive: bool,
    ) -> StorageResult<PolicyResult> {
        if !self.db.has_bucket(start_bucket) {
            return Err(StorageError::BucketNotFound(start_bucket.clone()));
        }

        let mut visited = HashSet::new();
        Ok(self.minimal_policy(start_bucket, key, recursive, &mut visited))
    }

    fn minimal_policy(
        &self,
        bucket_id: &BucketId,
        key: &PolicyKey,
        recursive: bool,
        visited: &mut HashSet<BucketId>,
    ) -> PolicyResult {
        visited.insert(bucket_id.clone());

        let bucket = match self.db.bucket(bucket_id) {
            Some(bucket) => bucket,
            None => return PolicyResult::from(PolicyType::NONE),
        };

        let mut minimal = bucket.default().clone();
        let mut has_minimal = false;

        let propose = |candidate: PolicyResult, minimal: &mut PolicyResult, has: &mut bool| {
            if !*has || candidate.policy_type() < minimal.policy_type() {
                *minimal = candidate;
            }
            *has = true;
        };

        for policy in self.db.search(bucket_id, key) {
            let result = policy.result;

            match result.policy_type() {
                // No lower value exists, stop here.
                PolicyType::DENY => return result,
                PolicyType::BUCKET => {
                    if !recursive {
                        continue;
                    }

                    let target: BucketId = result.metadata().clone();
                    if visited.contains(&target) || !self.db.has_bucket(&target) {
                        // Cycles are cut; dangling links evaluate as NONE.
                        continue;
                    }

                    let sub = self.minimal_policy(&target, key, true, visited);
                    if sub.policy_type() == PolicyType::NONE {
                        continue;
                    }
                    propose(sub, &mut minimal, &mut has_minimal);
                }
                _ => propose(result, &mut minimal, &mut has_minimal),
            }
        }

        minimal
    }

    /// All-or-nothing set of policy mutations. Validation covers every
    /// group before anything is applied: target buckets must exist, BUCKET
    /// results must point at existing buckets, and admin-only type markers
    /// are rejected.
    pub fn set_policies(
        &mut self,
        insert_or_update: &[(BucketId, Vec<Policy>)],
        remove: &[(BucketId, Vec<PolicyKey>)],
    ) -> StorageResult<()> {
        for (bucket_id, policies) in insert_or_update {
            if !self.db.has_bucket(bucket_id) {
                return Err(StorageError::BucketNotFound(bucket_id.clone()));
            }

            for policy in policies {
                let policy_type = policy.result.policy_type();

                if policy_type == PolicyType::DELETE {
                    return Err(StorageError::InvalidPolicyType(policy_type));
                }

                if policy_type == PolicyType::BUCKET {
                    let target: BucketId = policy.result.metadata().clone();
                    if !self.db.has_bucket(&target) {
                        return Err(StorageError::BucketNotFound(target));
                    }
                }
            }
        }

        for (bucket_id, _) in remove {
            if !self.db.has_bucket(bucket_id) {
                return Err(StorageError::BucketNotFound(bucket_id.clone()));
            }
        }

        for (bucket_id, policies) in insert_or_update {
            for policy in policies {
                self.db.insert_policy(bucket_id, policy.clone())?;
            }
        }

        for (bucket_id, keys) in remove {
            for key in keys {
                self.db.delete_policy(bucket_id, key)?;
            }
        }

        Ok(())
    }

    /// Create or overwrite a bucket. The root bucket may never default to
    /// NONE; the admin-only markers are not valid defaults.
    pub fn insert_or_update_bucket(
        &mut self,
        bucket_id: BucketId,
        default: PolicyResult,
    ) -> StorageResult<()> {
        if bucket_id == ROOT_BUCKET && default.policy_type() == PolicyType::NONE {
            return Err(StorageError::DefaultBucketSetNone);
        }

        if default.policy_type() == PolicyType::DELETE {
            return Err(StorageError::InvalidPolicyType(default.policy_type()));
        }

        if self.db.has_bucket(&bucket_id) {
            self.db.update_bucket(&bucket_id, default)
        } else {
            self.db.create_bucket(bucket_id, default);
            Ok(())
        }
    }

    /// Remove a bucket together with every policy linking into it.
    pub fn remove_bucket(&mut self, bucket_id: &BucketId) -> StorageResult<()> {
        if *bucket_id == ROOT_BUCKET {
            return Err(StorageError::DefaultBucketDeletion);
        }

        if !self.db.has_bucket(bucket_id) {
            return Err(StorageError::BucketNotFound(bucket_id.clone()));
        }

        self.db.delete_linking(bucket_id);
        self.db.delete_bucket(bucket_id)
    }

    pub fn list_policies(
        &self,
        bucket_id: &BucketId,
        filter: &PolicyKey,
    ) -> StorageResult<Vec<Policy>> {
        self.db.list_policies(bucket_id, filter)
    }

    pub fn erase_policies(
        &mut self,
        start_bucket: &BucketId,
        recursive: bool,
        filter: &PolicyKey,
    ) -> StorageResult<()> {
        self.db.erase_policies(start_bucket, recursive, filter)
    }

    pub fn load(&mut self) -> StorageResult<()> {
        self.db.load()
    }

    pub fn save(&mut self) -> StorageResult<()> {
        self.db.save()
    }
}
