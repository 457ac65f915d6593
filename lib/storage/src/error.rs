use std::io;
use warden_core::{BucketId, PolicyType};

#[derive(Debug)]
pub enum StorageError {
    /// A named bucket does not exist.
    BucketNotFound(BucketId),
    /// Attempt to remove the root bucket.
    DefaultBucketDeletion,
    /// Attempt to give the root bucket a default of NONE.
    DefaultBucketSetNone,
    /// A policy carried a type that may never be stored.
    InvalidPolicyType(PolicyType),
    /// A record in a database file failed to parse.
    RecordCorrupted { filename: String, line: usize },
    /// File content does not match its recorded digest.
    ChecksumMismatch(String),
    /// Structural damage: missing or unreadable database files.
    DatabaseCorrupted(String),
    /// Another service instance holds the database lock.
    LockUnavailable,
    Io(io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> StorageError {
        StorageError::Io(err)
    }
}
