//! Bucketed policy storage: in-memory database with recursive minimal-result
//! evaluation and a crash-safe, checksum-sealed on-disk form.

pub mod backend;
pub mod bucket;
pub mod checksum;
pub mod error;
pub mod integrity;
pub mod interner;
pub mod lock;
pub mod serialize;
pub mod storage;

pub use crate::error::{StorageError, StorageResult};
pub use crate::storage::Storage;
