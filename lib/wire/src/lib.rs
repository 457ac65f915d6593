//! Framed wire protocol shared by all warden sockets: a length-prefixed
//! frame layer, little-endian field encoding, and the four dialects spoken
//! on the client, admin, agent and monitor-get sockets.

pub mod buffer;
pub mod dialect;
pub mod encoding;
pub mod frame;
pub mod messages;
pub mod sequence;
pub mod support;
pub mod transport;

pub use crate::buffer::BinaryQueue;
pub use crate::support::{WireError, WireResult};
