use warden_core::{ApiCode, PolicyResult, PolicyType};
use warden_plugin::{ClientPlugin, PolicyDescription};

/// Built-in interpretation of the two predefined decisions. Results carry
/// no session binding, so they are always cacheable and always usable.
pub struct NaiveInterpreter;

impl ClientPlugin for NaiveInterpreter {
    fn supported_descriptions(&self) -> Vec<PolicyDescription> {
        vec![
            PolicyDescription {
                policy_type: PolicyType::DENY,
                name: "DENY".to_string(),
            },
            PolicyDescription {
                policy_type: PolicyType::ALLOW,
                name: "ALLOW".to_string(),
            },
        ]
    }

    fn is_cacheable(&self, _session: &str, _result: &PolicyResult) -> bool {
        true
    }

    fn is_usable(
        &self,
        _session: &str,
        _cached_session: &str,
        update_session: &mut bool,
        _result: &mut PolicyResult,
    ) -> bool {
        *update_session = false;
        true
    }

    fn to_result(&self, _session: &str, result: &PolicyResult) -> ApiCode {
        match result.policy_type() {
            PolicyType::ALLOW => ApiCode::AccessAllowed,
            _ => ApiCode::AccessDenied,
        }
    }

    fn invalidate(&mut self) {}
}
