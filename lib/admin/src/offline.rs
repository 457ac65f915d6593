use crate::logic::AdminApi;
use slog::{warn, Logger};
use std::path::Path;
use warden_core::paths::DB_DIR;
use warden_core::{ApiCode, BucketId, Policy, PolicyKey, PolicyResult, PolicyType};
use warden_storage::backend::Database;
use warden_storage::lock::FileLock;
use warden_storage::{Storage, StorageError};

fn code_from_storage(err: StorageError) -> ApiCode {
    match err {
        StorageError::BucketNotFound(_) => ApiCode::BucketNotFound,
        StorageError::DefaultBucketDeletion | StorageError::DefaultBucketSetNone => {
            ApiCode::OperationNotAllowed
        }
        StorageError::InvalidPolicyType(_) => ApiCode::InvalidParam,
        StorageError::RecordCorrupted { .. }
        | StorageError::ChecksumMismatch(_)
        | StorageError::DatabaseCorrupted(_) => ApiCode::DatabaseCorrupted,
        StorageError::LockUnavailable => ApiCode::OperationFailed,
        StorageError::Io(_) => ApiCode::OperationFailed,
    }
}

/// Admin operations straight against the on-disk database. Holds the
/// database lock for its whole lifetime, so a service cannot start (and
/// the service being up means this cannot be constructed).
pub struct OfflineAdmin {
    storage: Storage,
    _lock: FileLock,
    log: Logger,
}

impl OfflineAdmin {
    pub fn open(state_dir: &Path, log: &Logger) -> Result<OfflineAdmin, ApiCode> {
        let lock = match FileLock::try_acquire(state_dir, log) {
            Ok(lock) => lock,
            Err(StorageError::LockUnavailable) => return Err(ApiCode::OperationNotAllowed),
            Err(_) => return Err(ApiCode::OperationFailed),
        };

        let mut storage = Storage::new(Database::new(state_dir.join(DB_DIR), log));
        storage.load().map_err(code_from_storage)?;

        Ok(OfflineAdmin {
            storage,
            _lock: lock,
            log: log.clone(),
        })
    }

    /// Apply a mutation and persist it; validation failures leave the disk
    /// untouched.
    fn apply<F>(&mut self, mutate: F) -> ApiCode
    where
        F: FnOnce(&mut Storage) -> Result<(), StorageError>,
    {
        if let Err(err) = mutate(&mut self.storage) {
            return code_from_storage(err);
        }

        match self.storage.save() {
            Ok(()) => ApiCode::Success,
            Err(err) => {
                warn!(self.log, "database save failed"; "error" => ?err);
                code_from_storage(err)
            }
        }
    }
}

impl AdminApi for OfflineAdmin {
    fn set_bucket(&mut self, bucket: &BucketId, default: PolicyResult) -> ApiCode {
        let bucket = bucket.clone();
        self.apply(move |storage| storage.insert_or_update_bucket(bucket, default))
    }

    fn remove_bucket(&mut self, bucket: &BucketId) -> ApiCode {
        self.apply(|storage| storage.remove_bucket(bucket))
    }

    fn set_policies(
        &mut self,
        insert_or_update: Vec<(BucketId, Vec<Policy>)>,
        remove: Vec<(BucketId, Vec<PolicyKey>)>,
    ) -> ApiCode {
        self.apply(move |storage| storage.set_policies(&insert_or_update, &remove))
    }

    fn check(
        &mut self,
        key: &PolicyKey,
        start_bucket: &BucketId,
        recursive: bool,
    ) -> Result<PolicyResult, ApiCode> {
        self.storage
            .check_policy(key, start_bucket, recursive)
            .map_err(code_from_storage)
    }

    fn list(
        &mut self,
        bucket: &BucketId,
        filter: &PolicyKey,
    ) -> Result<Vec<Policy>, ApiCode> {
        self.storage
            .list_policies(bucket, filter)
            .map_err(code_from_storage)
    }

    fn erase(&mut self, start_bucket: &BucketId, recursive: bool, filter: &PolicyKey) -> ApiCode {
        self.apply(|storage| storage.erase_policies(start_bucket, recursive, filter))
    }

    /// Without a service there are no plugins; only the predefined types
    /// can be described.
    fn descriptions(&mut self) -> Result<Vec<(u16, String)>, ApiCode> {
        Ok(vec![
            (PolicyType::DENY.0, "DENY".to_string()),
            (PolicyType::NONE.0, "NONE".to_string()),
            (PolicyType::ALLOW.0, "ALLOW".to_string()),
            (PolicyType::BUCKET.0, "BUCKET".to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::logging;
    use warden_core::types::{ANY, ROOT_BUCKET};

    fn open(dir: &Path) -> OfflineAdmin {
        OfflineAdmin::open(dir, &logging::discard()).unwrap()
    }

    #[test]
    fn test_mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut admin = open(dir.path());
            assert_eq!(
                admin.set_bucket(
                    &BucketId::from("extra"),
                    PolicyResult::from(PolicyType::ALLOW)
                ),
                ApiCode::Success
            );
            assert_eq!(
                admin.set_policies(
                    vec![(
                        BucketId::from(ROOT_BUCKET),
                        vec![Policy::new(
                            PolicyKey::new("c", "u", "*"),
                            PolicyResult::new(PolicyType::BUCKET, "extra"),
                        )],
                    )],
                    vec![],
                ),
                ApiCode::Success
            );
        }

        let mut reopened = open(dir.path());
        let result = reopened
            .check(&PolicyKey::new("c", "u", "p"), &BucketId::from(ROOT_BUCKET), true)
            .unwrap();
        assert_eq!(result.policy_type(), PolicyType::ALLOW);

        let listed = reopened
            .list(&BucketId::from(ROOT_BUCKET), &PolicyKey::new(ANY, ANY, ANY))
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_validation_errors_map_to_codes() {
        let dir = tempfile::tempdir().unwrap();
        let mut admin = open(dir.path());

        assert_eq!(
            admin.set_bucket(
                &BucketId::from(ROOT_BUCKET),
                PolicyResult::from(PolicyType::NONE)
            ),
            ApiCode::OperationNotAllowed
        );
        assert_eq!(
            admin.remove_bucket(&BucketId::from(ROOT_BUCKET)),
            ApiCode::OperationNotAllowed
        );
        assert_eq!(
            admin.remove_bucket(&BucketId::from("ghost")),
            ApiCode::BucketNotFound
        );
    }
}
