use slog::{info, o, Logger};
use warden_core::audit::{decision_label, AuditLevel};
use warden_core::{PolicyKey, PolicyResult};

/// Privilege-check audit trail. Which decisions are recorded is selected
/// by `WARDEN_AUDIT_LEVEL`; the default records denials.
pub struct AuditLog {
    level: AuditLevel,
    log: Logger,
}

impl AuditLog {
    pub fn new(log: &Logger) -> AuditLog {
        AuditLog {
            level: AuditLevel::from_env(),
            log: log.new(o!("log_type" => "audit")),
        }
    }

    #[cfg(test)]
    pub fn with_level(level: AuditLevel, log: &Logger) -> AuditLog {
        AuditLog {
            level,
            log: log.new(o!("log_type" => "audit")),
        }
    }

    pub fn log(&self, key: &PolicyKey, result: &PolicyResult) {
        if self.level.covers(result.policy_type()) {
            info!(self.log, "{};{};{} => {}",
                  key.client, key.user, key.privilege, decision_label(result));
        }
    }
}
