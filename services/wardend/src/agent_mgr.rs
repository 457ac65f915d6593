use crate::link::LinkId;
use hashbrown::HashMap;
use slog::{info, o, warn, Logger};
use warden_plugin::AgentType;
use warden_wire::messages::WireCode;
use warden_wire::sequence::SequenceContainer;

/// Registry of connected agents. One exclusive handler per agent type;
/// check ids pushed to an agent come from a per-agent bitset allocator, so
/// each agent link can carry up to 65536 concurrent delegated checks.
pub struct AgentManager {
    agents: HashMap<AgentType, LinkId>,
    by_link: HashMap<LinkId, AgentType>,
    check_ids: HashMap<LinkId, SequenceContainer>,
    log: Logger,
}

impl AgentManager {
    pub fn new(log: &Logger) -> AgentManager {
        AgentManager {
            agents: HashMap::new(),
            by_link: HashMap::new(),
            check_ids: HashMap::new(),
            log: log.new(o!("module" => "agents")),
        }
    }

    pub fn register(&mut self, agent_type: &str, link: LinkId) -> WireCode {
        if self.agents.contains_key(agent_type) {
            warn!(self.log, "agent type already registered"; "agent_type" => agent_type);
            return WireCode::Rejected;
        }

        self.agents.insert(agent_type.to_string(), link);
        self.by_link.insert(link, agent_type.to_string());
        self.check_ids.insert(link, SequenceContainer::new());

        info!(self.log, "agent registered"; "agent_type" => agent_type, "link" => link);
        WireCode::Success
    }

    pub fn agent_link(&self, agent_type: &str) -> Option<LinkId> {
        self.agents.get(agent_type).copied()
    }

    pub fn allocate_check_id(&mut self, link: LinkId) -> Option<u16> {
        self.check_ids.get_mut(&link)?.acquire()
    }

    pub fn release_check_id(&mut self, link: LinkId, check_id: u16) {
        if let Some(container) = self.check_ids.get_mut(&link) {
            container.release(check_id);
        }
    }

    /// Remove a disconnected agent; returns the type it served, if any.
    pub fn unregister(&mut self, link: LinkId) -> Option<AgentType> {
        let agent_type = self.by_link.remove(&link)?;
        self.agents.remove(&agent_type);
        self.check_ids.remove(&link);

        info!(self.log, "agent unregistered"; "agent_type" => %agent_type, "link" => link);
        Some(agent_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::logging;

    #[test]
    fn test_exclusive_registration_per_type() {
        let mut manager = AgentManager::new(&logging::discard());

        assert_eq!(manager.register("a.test", 8), WireCode::Success);
        assert_eq!(manager.register("a.test", 9), WireCode::Rejected);
        assert_eq!(manager.agent_link("a.test"), Some(8));

        assert_eq!(manager.unregister(8), Some("a.test".to_string()));
        assert_eq!(manager.register("a.test", 9), WireCode::Success);
    }

    #[test]
    fn test_check_ids_are_per_agent() {
        let mut manager = AgentManager::new(&logging::discard());
        manager.register("a", 8);
        manager.register("b", 9);

        assert_eq!(manager.allocate_check_id(8), Some(0));
        assert_eq!(manager.allocate_check_id(8), Some(1));
        assert_eq!(manager.allocate_check_id(9), Some(0));

        manager.release_check_id(8, 0);
        assert_eq!(manager.allocate_check_id(8), Some(0));

        // Not an agent link at all.
        assert_eq!(manager.allocate_check_id(17), None);
    }
}
