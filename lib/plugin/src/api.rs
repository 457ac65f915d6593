use warden_core::{ApiCode, PolicyKey, PolicyResult, PolicyType};

/// Opaque data exchanged between a plugin and its agent.
pub type PluginData = String;

/// Names the kind of agent a plugin wants to talk to.
pub type AgentType = String;

/// Session identifier supplied by client applications; plugins may bind
/// cached results to it.
pub type ClientSession = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDescription {
    pub policy_type: PolicyType,
    pub name: String,
}

/// Plugin failure; the caller downgrades it to a denial.
#[derive(Debug, PartialEq, Eq)]
pub struct PluginError;

/// What a service plugin's `check` produced: a finished result, or a
/// request to round-trip through an agent of the named type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Ready(PolicyResult),
    NotReady {
        agent_type: AgentType,
        data: PluginData,
    },
}

/// Service-side plugin: evaluates checks for its registered policy types,
/// possibly suspending on an agent.
pub trait ServicePlugin {
    fn supported_descriptions(&self) -> Vec<PolicyDescription>;

    fn check(&mut self, key: &PolicyKey) -> Result<CheckOutcome, PluginError>;

    /// Fold an agent's reply into a final result.
    fn update(&mut self, key: &PolicyKey, agent_data: &str) -> Result<PolicyResult, PluginError>;

    /// Called when the host reloads its plugin set.
    fn invalidate(&mut self);
}

/// Client-side plugin: interprets stored results for the decision cache.
pub trait ClientPlugin {
    fn supported_descriptions(&self) -> Vec<PolicyDescription>;

    /// May this result be kept in the cache for this session?
    fn is_cacheable(&self, session: &str, result: &PolicyResult) -> bool;

    /// Is a cached entry still valid? The plugin may rewrite the stored
    /// result and ask for the entry's session fingerprint to be refreshed.
    fn is_usable(
        &self,
        session: &str,
        cached_session: &str,
        update_session: &mut bool,
        result: &mut PolicyResult,
    ) -> bool;

    /// Translate a stored result into the public access code.
    fn to_result(&self, session: &str, result: &PolicyResult) -> ApiCode;

    fn invalidate(&mut self);
}
