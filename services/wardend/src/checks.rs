use crate::link::LinkId;
use hashbrown::HashMap;
use warden_core::{PolicyKey, PolicyType};

/// Bookkeeping for one delegated check: who asked (and under which
/// sequence number), what was asked, which plugin owns the answer, and
/// which agent connection carries it under which check id.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub requester: LinkId,
    pub requester_seq: u16,
    pub key: PolicyKey,
    pub policy_type: PolicyType,
    pub agent_link: LinkId,
    pub check_id: u16,
}

/// Table of in-flight delegated checks, addressable from both ends: by the
/// agent leg (replies) and by the requester leg (cancellation).
pub struct CheckRequestManager {
    by_agent: HashMap<(LinkId, u16), CheckContext>,
    by_requester: HashMap<(LinkId, u16), (LinkId, u16)>,
}

impl CheckRequestManager {
    pub fn new() -> CheckRequestManager {
        CheckRequestManager {
            by_agent: HashMap::new(),
            by_requester: HashMap::new(),
        }
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.by_agent.len()
    }

    /// False when the requester already has a check under this sequence
    /// number, which would make replies ambiguous.
    pub fn create(&mut self, context: CheckContext) -> bool {
        let requester_key = (context.requester, context.requester_seq);
        let agent_key = (context.agent_link, context.check_id);

        if self.by_requester.contains_key(&requester_key) {
            return false;
        }

        self.by_requester.insert(requester_key, agent_key);
        self.by_agent.insert(agent_key, context);
        true
    }

    pub fn take_by_agent(&mut self, agent_link: LinkId, check_id: u16) -> Option<CheckContext> {
        let context = self.by_agent.remove(&(agent_link, check_id))?;
        self.by_requester
            .remove(&(context.requester, context.requester_seq));
        Some(context)
    }

    pub fn take_by_requester(&mut self, requester: LinkId, seq: u16) -> Option<CheckContext> {
        let agent_key = self.by_requester.remove(&(requester, seq))?;
        self.by_agent.remove(&agent_key)
    }

    /// All contexts created for a requester connection; used when it goes
    /// away.
    pub fn drain_requester(&mut self, requester: LinkId) -> Vec<CheckContext> {
        let keys: Vec<(LinkId, u16)> = self
            .by_requester
            .iter()
            .filter(|((link, _), _)| *link == requester)
            .map(|(key, _)| *key)
            .collect();

        keys.into_iter()
            .filter_map(|(link, seq)| self.take_by_requester(link, seq))
            .collect()
    }

    /// All contexts routed through an agent connection; used when the
    /// agent goes away.
    pub fn drain_agent(&mut self, agent_link: LinkId) -> Vec<CheckContext> {
        let keys: Vec<(LinkId, u16)> = self
            .by_agent
            .keys()
            .filter(|(link, _)| *link == agent_link)
            .copied()
            .collect();

        keys.into_iter()
            .filter_map(|(link, check_id)| self.take_by_agent(link, check_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(requester: LinkId, seq: u16, agent: LinkId, check_id: u16) -> CheckContext {
        CheckContext {
            requester,
            requester_seq: seq,
            key: PolicyKey::new("c", "u", "p"),
            policy_type: PolicyType(100),
            agent_link: agent,
            check_id,
        }
    }

    #[test]
    fn test_addressable_from_both_ends() {
        let mut manager = CheckRequestManager::new();
        assert!(manager.create(context(1, 42, 9, 0)));

        let taken = manager.take_by_agent(9, 0).unwrap();
        assert_eq!(taken.requester_seq, 42);
        // Gone from both indexes.
        assert!(manager.take_by_requester(1, 42).is_none());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_duplicate_requester_seq_is_refused() {
        let mut manager = CheckRequestManager::new();
        assert!(manager.create(context(1, 42, 9, 0)));
        assert!(!manager.create(context(1, 42, 9, 1)));
    }

    #[test]
    fn test_drain_by_requester_and_agent() {
        let mut manager = CheckRequestManager::new();
        manager.create(context(1, 1, 9, 0));
        manager.create(context(1, 2, 9, 1));
        manager.create(context(2, 1, 9, 2));

        let drained = manager.drain_requester(1);
        assert_eq!(drained.len(), 2);
        assert_eq!(manager.len(), 1);

        let drained = manager.drain_agent(9);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].requester, 2);
        assert_eq!(manager.len(), 0);
    }
}
