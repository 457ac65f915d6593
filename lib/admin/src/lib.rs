//! Administrative library. Prefers the admin socket of a running service;
//! with no service listening it falls back to operating on the database
//! directly, under the same advisory lock the service takes.

pub mod logic;
pub mod offline;
pub mod online;

pub use crate::logic::{Admin, AdminApi, AdminConfig};
