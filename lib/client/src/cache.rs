use hashbrown::HashMap;
use slog::{debug, o, Logger};
use warden_core::{ApiCode, PolicyKey, PolicyResult};
use warden_plugin::{ClientPlugin, PluginRegistry};

const NIL: usize = usize::max_value();

struct Node {
    key: String,
    prev: usize,
    next: usize,
}

/// Recency list backing the cache. Nodes live in a slab; handles are slab
/// indices, reused through a free list, so map entries never hold pointers.
struct UsageList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl UsageList {
    fn new() -> UsageList {
        UsageList {
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn push_front(&mut self, key: String) -> usize {
        let handle = match self.free.pop() {
            Some(handle) => {
                self.nodes[handle] = Node {
                    key,
                    prev: NIL,
                    next: self.head,
                };
                handle
            }
            None => {
                self.nodes.push(Node {
                    key,
                    prev: NIL,
                    next: self.head,
                });
                self.nodes.len() - 1
            }
        };

        if self.head != NIL {
            self.nodes[self.head].prev = handle;
        }
        self.head = handle;
        if self.tail == NIL {
            self.tail = handle;
        }

        handle
    }

    fn unlink(&mut self, handle: usize) {
        let (prev, next) = (self.nodes[handle].prev, self.nodes[handle].next);

        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }

        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn remove(&mut self, handle: usize) {
        self.unlink(handle);
        self.nodes[handle].key.clear();
        self.free.push(handle);
    }

    fn move_to_front(&mut self, handle: usize) {
        if self.head == handle {
            return;
        }

        self.unlink(handle);
        self.nodes[handle].prev = NIL;
        self.nodes[handle].next = self.head;

        if self.head != NIL {
            self.nodes[self.head].prev = handle;
        }
        self.head = handle;
        if self.tail == NIL {
            self.tail = handle;
        }
    }

    /// Drop the least recently used node and return its cache key.
    fn pop_back(&mut self) -> Option<String> {
        if self.tail == NIL {
            return None;
        }

        let handle = self.tail;
        self.unlink(handle);
        let key = std::mem::replace(&mut self.nodes[handle].key, String::new());
        self.free.push(handle);
        Some(key)
    }

    fn front(&self) -> Option<&str> {
        if self.head == NIL {
            None
        } else {
            Some(&self.nodes[self.head].key)
        }
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }
}

struct CacheEntry {
    result: PolicyResult,
    session: String,
    usage: usize,
}

/// Bounded decision cache keyed by the stringified policy key. Hits consult
/// the interpreting plugin for continued usability; updates consult it for
/// cacheability. Capacity 0 disables caching entirely.
pub struct CapacityCache {
    capacity: usize,
    entries: HashMap<String, CacheEntry>,
    usage: UsageList,
    plugins: PluginRegistry<dyn ClientPlugin>,
    log: Logger,
}

impl CapacityCache {
    pub fn new(capacity: usize, plugins: PluginRegistry<dyn ClientPlugin>, log: &Logger) -> CapacityCache {
        CapacityCache {
            capacity,
            entries: HashMap::new(),
            usage: UsageList::new(),
            plugins,
            log: log.new(o!("module" => "cache")),
        }
    }

    fn key_to_string(key: &PolicyKey) -> String {
        // Lengths make the flattening injective.
        format!(
            "{}{}{}\u{1}{}\u{1}{}\u{1}{}",
            key.client,
            key.privilege,
            key.user,
            key.client.len(),
            key.privilege.len(),
            key.user.len()
        )
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.entries.len(), self.usage.len());
        self.entries.len()
    }

    pub fn get(&mut self, session: &str, key: &PolicyKey) -> ApiCode {
        let cache_key = Self::key_to_string(key);

        let entry = match self.entries.get_mut(&cache_key) {
            Some(entry) => entry,
            None => {
                debug!(self.log, "cache miss"; "key" => %key);
                return ApiCode::CacheMiss;
            }
        };

        let plugin = match self.plugins.get(entry.result.policy_type()) {
            Some(plugin) => plugin,
            None => {
                debug!(self.log, "no plugin for cached policy type";
                       "type" => %entry.result.policy_type());
                return ApiCode::AccessDenied;
            }
        };
        let plugin = plugin.borrow();

        let mut update_session = false;
        let usable = plugin.is_usable(
            session,
            &entry.session,
            &mut update_session,
            &mut entry.result,
        );

        if usable {
            if update_session {
                entry.session = session.to_string();
            }
            let code = plugin.to_result(session, &entry.result);
            self.usage.move_to_front(entry.usage);
            return code;
        }

        debug!(self.log, "cached entry no longer usable"; "key" => %key);
        let handle = entry.usage;
        self.usage.remove(handle);
        self.entries.remove(&cache_key);
        ApiCode::CacheMiss
    }

    pub fn update(&mut self, session: &str, key: &PolicyKey, result: PolicyResult) -> ApiCode {
        let plugin = match self.plugins.get(result.policy_type()) {
            Some(plugin) => plugin,
            None => {
                debug!(self.log, "no plugin for policy type";
                       "type" => %result.policy_type());
                return ApiCode::AccessDenied;
            }
        };

        let code = plugin.borrow().to_result(session, &result);

        if self.capacity == 0 {
            return code;
        }

        let cache_key = Self::key_to_string(key);

        if plugin.borrow().is_cacheable(session, &result) {
            if self.entries.len() == self.capacity && !self.entries.contains_key(&cache_key) {
                self.evict();
            }

            match self.entries.get_mut(&cache_key) {
                Some(entry) => {
                    entry.result = result;
                    entry.session = session.to_string();
                    let handle = entry.usage;
                    self.usage.move_to_front(handle);
                }
                None => {
                    let handle = self.usage.push_front(cache_key.clone());
                    self.entries.insert(
                        cache_key,
                        CacheEntry {
                            result,
                            session: session.to_string(),
                            usage: handle,
                        },
                    );
                }
            }
        } else if let Some(entry) = self.entries.remove(&cache_key) {
            self.usage.remove(entry.usage);
        }

        code
    }

    fn evict(&mut self) {
        if let Some(cache_key) = self.usage.pop_back() {
            debug!(self.log, "evicting least recently used entry");
            self.entries.remove(&cache_key);
        }
    }

    /// Drop every entry and tell the plugins their world changed.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.usage.clear();
        self.plugins.invalidate_all();
    }

    #[cfg(test)]
    fn most_recent(&self) -> Option<&str> {
        self.usage.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::NaiveInterpreter;
    use std::cell::RefCell;
    use std::rc::Rc;
    use warden_core::logging;
    use warden_core::PolicyType;
    use warden_plugin::PolicyDescription;

    fn cache(capacity: usize) -> CapacityCache {
        let log = logging::discard();
        let mut plugins: PluginRegistry<dyn ClientPlugin> = PluginRegistry::new(log.clone());
        let interpreter: Rc<RefCell<Box<dyn ClientPlugin>>> =
            Rc::new(RefCell::new(Box::new(NaiveInterpreter)));
        plugins.register(
            interpreter.borrow().supported_descriptions(),
            interpreter.clone(),
        );
        CapacityCache::new(capacity, plugins, &log)
    }

    fn key(name: &str) -> PolicyKey {
        PolicyKey::new(name, "user", "privilege")
    }

    fn allow() -> PolicyResult {
        PolicyResult::from(PolicyType::ALLOW)
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache = cache(10);

        assert_eq!(cache.get("s", &key("a")), ApiCode::CacheMiss);

        assert_eq!(cache.update("s", &key("a"), allow()), ApiCode::AccessAllowed);
        assert_eq!(cache.get("s", &key("a")), ApiCode::AccessAllowed);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_deny_translates_and_caches() {
        let mut cache = cache(10);

        assert_eq!(
            cache.update("s", &key("a"), PolicyResult::from(PolicyType::DENY)),
            ApiCode::AccessDenied
        );
        assert_eq!(cache.get("s", &key("a")), ApiCode::AccessDenied);
    }

    #[test]
    fn test_unknown_type_is_denied_and_not_cached() {
        let mut cache = cache(10);

        assert_eq!(
            cache.update("s", &key("a"), PolicyResult::new(PolicyType(77), "x")),
            ApiCode::AccessDenied
        );
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let mut cache = cache(2);

        cache.update("s", &key("a"), allow());
        cache.update("s", &key("b"), allow());

        // Touch "a" so "b" becomes the victim.
        assert_eq!(cache.get("s", &key("a")), ApiCode::AccessAllowed);

        cache.update("s", &key("c"), allow());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("s", &key("b")), ApiCode::CacheMiss);
        assert_eq!(cache.get("s", &key("a")), ApiCode::AccessAllowed);
        assert_eq!(cache.get("s", &key("c")), ApiCode::AccessAllowed);
    }

    #[test]
    fn test_hit_moves_entry_to_front() {
        let mut cache = cache(3);

        cache.update("s", &key("a"), allow());
        cache.update("s", &key("b"), allow());

        assert_eq!(
            cache.most_recent(),
            Some(CapacityCache::key_to_string(&key("b")).as_str())
        );

        cache.get("s", &key("a"));

        assert_eq!(
            cache.most_recent(),
            Some(CapacityCache::key_to_string(&key("a")).as_str())
        );
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = cache(0);

        assert_eq!(cache.update("s", &key("a"), allow()), ApiCode::AccessAllowed);
        assert_eq!(cache.get("s", &key("a")), ApiCode::CacheMiss);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_update_existing_key_does_not_grow() {
        let mut cache = cache(2);

        cache.update("s", &key("a"), allow());
        cache.update("s", &key("b"), allow());
        cache.update("s", &key("b"), PolicyResult::from(PolicyType::DENY));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("s", &key("a")), ApiCode::AccessAllowed);
        assert_eq!(cache.get("s", &key("b")), ApiCode::AccessDenied);
    }

    #[test]
    fn test_clear_empties_cache() {
        let mut cache = cache(4);

        cache.update("s", &key("a"), allow());
        cache.update("s", &key("b"), allow());
        cache.clear();

        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get("s", &key("a")), ApiCode::CacheMiss);
    }

    #[test]
    fn test_key_stringification_is_injective() {
        // ("ab","c") and ("a","bc") must not collide.
        let first = CapacityCache::key_to_string(&PolicyKey::new("ab", "c", "p"));
        let second = CapacityCache::key_to_string(&PolicyKey::new("a", "bc", "p"));

        assert_ne!(first, second);
    }
}
