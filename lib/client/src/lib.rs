//! Client libraries: the synchronous checker, the caller-driven async
//! checker, and the client-side decision and monitor-entry caches.

pub mod async_logic;
pub mod cache;
pub mod interpreter;
pub mod logic;
pub mod monitor_cache;

pub use crate::async_logic::{AsyncClient, AsyncConfig, Interest};
pub use crate::cache::CapacityCache;
pub use crate::logic::{Client, ClientConfig};
