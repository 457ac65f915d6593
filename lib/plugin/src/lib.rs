//! Plugin interfaces of the policy service. Service-side plugins answer (or
//! delegate) checks for plugin-defined policy types; client-side plugins
//! decide cacheability and translate stored results into access codes.
//! External plugins are shared objects exposing `create`/`destroy`.

pub mod api;
pub mod loader;
pub mod registry;

pub use crate::api::{
    AgentType, CheckOutcome, ClientPlugin, ClientSession, PluginData, PluginError,
    PolicyDescription, ServicePlugin,
};
pub use crate::registry::PluginRegistry;
