use crate::types::{PolicyResult, PolicyType};
use std::env;

pub const AUDIT_LEVEL_ENV: &str = "WARDEN_AUDIT_LEVEL";

/// Selects which decisions end up in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    None,
    Deny,
    Allow,
    Other,
    All,
}

impl AuditLevel {
    /// Reads `WARDEN_AUDIT_LEVEL`; unset or unrecognized values keep the
    /// default of logging denials only.
    pub fn from_env() -> AuditLevel {
        match env::var(AUDIT_LEVEL_ENV) {
            Ok(value) => Self::parse(&value).unwrap_or(AuditLevel::Deny),
            Err(_) => AuditLevel::Deny,
        }
    }

    pub fn parse(name: &str) -> Option<AuditLevel> {
        match name {
            "NONE" => Some(AuditLevel::None),
            "DENY" => Some(AuditLevel::Deny),
            "ALLOW" => Some(AuditLevel::Allow),
            "OTHER" => Some(AuditLevel::Other),
            "ALL" => Some(AuditLevel::All),
            _ => None,
        }
    }

    /// Should a decision of the given type be audit-logged at this level?
    pub fn covers(self, policy_type: PolicyType) -> bool {
        match self {
            AuditLevel::None => false,
            AuditLevel::All => true,
            AuditLevel::Deny => policy_type == PolicyType::DENY,
            AuditLevel::Allow => policy_type == PolicyType::ALLOW,
            AuditLevel::Other => {
                policy_type != PolicyType::DENY && policy_type != PolicyType::ALLOW
            }
        }
    }
}

/// Audit-log rendering of a decision.
pub fn decision_label(result: &PolicyResult) -> &'static str {
    match result.policy_type() {
        PolicyType::DENY => "DENY",
        PolicyType::ALLOW => "ALLOW",
        _ => "OTHER",
    }
}
