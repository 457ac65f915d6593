use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use slog::{info, Logger};
use std::fs::File;
use std::path::Path;

/// Advisory exclusive lock over the state directory, held for the lifetime
/// of the owning service. A second instance fails to acquire it and must
/// refuse to start.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn try_acquire(path: &Path, log: &Logger) -> StorageResult<FileLock> {
        let file = File::open(path).map_err(StorageError::Io)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!(log, "database lock acquired"; "path" => %path.display());
                Ok(FileLock { file })
            }
            Err(_) => Err(StorageError::LockUnavailable),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::logging;

    #[test]
    fn test_second_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let log = logging::discard();

        let first = FileLock::try_acquire(dir.path(), &log).unwrap();

        assert!(matches!(
            FileLock::try_acquire(dir.path(), &log),
            Err(StorageError::LockUnavailable)
        ));

        drop(first);
        assert!(FileLock::try_acquire(dir.path(), &log).is_ok());
    }
}
