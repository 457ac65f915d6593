//! Crash-safety plumbing around the database file set. A save first writes
//! the complete new state as `~`-suffixed backups, then drops a zero-byte
//! guard file, then renames the backups over the primaries and removes the
//! guard. A guard found on startup means the backup set is authoritative:
//! for every file the `~` copy, where still present, is preferred and the
//! interrupted swap is finished.

use crate::error::StorageResult;
use slog::{debug, warn, Logger};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use warden_core::paths::{
    BACKUP_SUFFIX, BUCKET_FILENAME_PREFIX, CHECKSUM_FILENAME, GUARD_FILENAME, INDEX_FILENAME,
};

pub struct Integrity {
    db_path: PathBuf,
    log: Logger,
}

impl Integrity {
    pub fn new<P: Into<PathBuf>>(db_path: P, log: Logger) -> Integrity {
        Integrity {
            db_path: db_path.into(),
            log,
        }
    }

    #[inline]
    pub fn primary(&self, filename: &str) -> PathBuf {
        self.db_path.join(filename)
    }

    #[inline]
    pub fn backup(&self, filename: &str) -> PathBuf {
        self.db_path.join(format!("{}{}", filename, BACKUP_SUFFIX))
    }

    /// Path to read `filename` from: the backup copy when the guard selects
    /// the backup set and the copy still exists, the primary otherwise.
    pub fn select(&self, filename: &str, prefer_backup: bool) -> PathBuf {
        if prefer_backup {
            let backup = self.backup(filename);
            if backup.exists() {
                return backup;
            }
        }
        self.primary(filename)
    }

    pub fn backup_guard_exists(&self) -> bool {
        self.primary(GUARD_FILENAME).exists()
    }

    pub fn create_backup_guard(&self) -> StorageResult<()> {
        let guard = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.primary(GUARD_FILENAME))?;
        guard.sync_all()?;
        self.sync_dir()?;
        Ok(())
    }

    pub fn remove_backup_guard(&self) -> StorageResult<()> {
        fs::remove_file(self.primary(GUARD_FILENAME))?;
        self.sync_dir()?;
        Ok(())
    }

    /// Write a backup file and push it to stable media.
    pub fn write_backup(&self, filename: &str, content: &[u8]) -> StorageResult<()> {
        let path = self.backup(filename);
        let mut file = File::create(&path)?;
        file.write_all(content)?;
        file.sync_all()?;

        debug!(self.log, "backup file written";
               "file" => %path.display(), "bytes" => content.len());
        Ok(())
    }

    /// Move every listed backup over its primary. Backups missing because a
    /// previous run already moved them are skipped.
    pub fn promote_backups(&self, filenames: &[String]) -> StorageResult<()> {
        for filename in filenames {
            let backup = self.backup(filename);
            if backup.exists() {
                fs::rename(&backup, self.primary(filename))?;
            }
        }
        self.sync_dir()?;
        Ok(())
    }

    pub fn sync_dir(&self) -> StorageResult<()> {
        File::open(&self.db_path)?.sync_all()?;
        Ok(())
    }

    /// Remove everything in the database directory that is not the index,
    /// the checksum book, the guard, or an indexed bucket file.
    pub fn delete_non_indexed<F: Fn(&str) -> bool>(&self, is_indexed: F) -> StorageResult<()> {
        for entry in fs::read_dir(&self.db_path)? {
            let entry = entry?;
            let name_os = entry.file_name();
            let name = match name_os.to_str() {
                Some(name) => name,
                None => {
                    fs::remove_file(entry.path())?;
                    continue;
                }
            };

            if name == INDEX_FILENAME || name == CHECKSUM_FILENAME || name == GUARD_FILENAME {
                continue;
            }

            let keep = name
                .strip_prefix(BUCKET_FILENAME_PREFIX)
                .map(|id| is_indexed(id))
                .unwrap_or(false);

            if !keep {
                warn!(self.log, "removing stray database file"; "file" => name);
                fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
