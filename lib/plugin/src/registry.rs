use crate::api::{ClientPlugin, PolicyDescription, ServicePlugin};
use hashbrown::HashMap;
use libloading::Library;
use slog::{debug, warn, Logger};
use std::cell::RefCell;
use std::rc::Rc;
use warden_core::PolicyType;

/// Maps policy types to their handling plugin. Multiple plugins may claim
/// disjoint types; on a collision the later registration loses. Library
/// handles live here too, and outlive every plugin object they produced
/// (field order keeps plugins dropping first).
pub struct PluginRegistry<P: ?Sized> {
    plugins: HashMap<u16, Rc<RefCell<Box<P>>>>,
    descriptions: Vec<PolicyDescription>,
    libraries: Vec<Library>,
    log: Logger,
}

impl<P: ?Sized> PluginRegistry<P> {
    pub fn new(log: Logger) -> PluginRegistry<P> {
        PluginRegistry {
            plugins: HashMap::new(),
            descriptions: Vec::new(),
            libraries: Vec::new(),
            log,
        }
    }

    pub fn register(&mut self, descriptions: Vec<PolicyDescription>, plugin: Rc<RefCell<Box<P>>>) {
        for description in descriptions {
            let raw = description.policy_type.0;

            if self.plugins.contains_key(&raw) {
                warn!(self.log, "policy type already supported, keeping first registration";
                      "type" => %description.policy_type, "name" => %description.name);
                continue;
            }

            debug!(self.log, "policy type registered";
                   "type" => %description.policy_type, "name" => %description.name);
            self.plugins.insert(raw, plugin.clone());
            self.descriptions.push(description);
        }
    }

    pub fn get(&self, policy_type: PolicyType) -> Option<Rc<RefCell<Box<P>>>> {
        self.plugins.get(&policy_type.0).cloned()
    }

    pub fn is_registered(&self, policy_type: PolicyType) -> bool {
        self.plugins.contains_key(&policy_type.0)
    }

    /// Registered descriptions, ordered by policy type.
    pub fn descriptions(&self) -> Vec<PolicyDescription> {
        let mut descriptions = self.descriptions.clone();
        descriptions.sort_by_key(|description| description.policy_type);
        descriptions
    }

    pub(crate) fn adopt_library(&mut self, library: Library) {
        self.libraries.push(library);
    }
}

impl PluginRegistry<dyn ServicePlugin> {
    pub fn invalidate_all(&mut self) {
        for plugin in self.plugins.values() {
            plugin.borrow_mut().invalidate();
        }
    }
}

impl PluginRegistry<dyn ClientPlugin> {
    pub fn invalidate_all(&mut self) {
        for plugin in self.plugins.values() {
            plugin.borrow_mut().invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CheckOutcome, PluginError};
    use warden_core::logging;
    use warden_core::{PolicyKey, PolicyResult};

    struct StubPlugin;

    impl ServicePlugin for StubPlugin {
        fn supported_descriptions(&self) -> Vec<PolicyDescription> {
            vec![PolicyDescription {
                policy_type: PolicyType(100),
                name: "stub".to_string(),
            }]
        }

        fn check(&mut self, _key: &PolicyKey) -> Result<CheckOutcome, PluginError> {
            Err(PluginError)
        }

        fn update(&mut self, _key: &PolicyKey, _data: &str) -> Result<PolicyResult, PluginError> {
            Err(PluginError)
        }

        fn invalidate(&mut self) {}
    }

    fn stub() -> Rc<RefCell<Box<dyn ServicePlugin>>> {
        Rc::new(RefCell::new(Box::new(StubPlugin)))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry: PluginRegistry<dyn ServicePlugin> =
            PluginRegistry::new(logging::discard());

        let plugin = stub();
        registry.register(plugin.borrow().supported_descriptions(), plugin.clone());

        assert!(registry.is_registered(PolicyType(100)));
        assert!(registry.get(PolicyType(100)).is_some());
        assert!(registry.get(PolicyType(101)).is_none());
    }

    #[test]
    fn test_collision_keeps_first() {
        let mut registry: PluginRegistry<dyn ServicePlugin> =
            PluginRegistry::new(logging::discard());

        let first = stub();
        registry.register(first.borrow().supported_descriptions(), first.clone());

        let second = stub();
        registry.register(
            vec![PolicyDescription {
                policy_type: PolicyType(100),
                name: "usurper".to_string(),
            }],
            second.clone(),
        );

        let held = registry.get(PolicyType(100)).unwrap();
        assert!(Rc::ptr_eq(&held, &first));
        assert_eq!(registry.descriptions().len(), 1);
        assert_eq!(registry.descriptions()[0].name, "stub");
    }
}
