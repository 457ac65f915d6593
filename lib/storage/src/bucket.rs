use hashbrown::HashMap;
use warden_core::types::{ANY, WILDCARD};
use warden_core::{BucketId, Policy, PolicyKey, PolicyResult};

/// A named set of policies plus the default result returned when nothing
/// matches. Policies are unique by key.
pub struct PolicyBucket {
    id: BucketId,
    default: PolicyResult,
    policies: HashMap<PolicyKey, PolicyResult>,
}

impl PolicyBucket {
    pub fn new(id: BucketId, default: PolicyResult) -> PolicyBucket {
        PolicyBucket {
            id,
            default,
            policies: HashMap::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &BucketId {
        &self.id
    }

    #[inline]
    pub fn default(&self) -> &PolicyResult {
        &self.default
    }

    #[inline]
    pub fn set_default(&mut self, default: PolicyResult) {
        self.default = default;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Insert or overwrite by key.
    pub fn insert(&mut self, policy: Policy) {
        self.policies.insert(policy.key, policy.result);
    }

    /// Remove by exact key. True if something was removed.
    pub fn remove(&mut self, key: &PolicyKey) -> bool {
        self.policies.remove(key).is_some()
    }

    /// Exact-key lookup used by the variant-driven search.
    #[inline]
    pub fn get(&self, key: &PolicyKey) -> Option<&PolicyResult> {
        self.policies.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = Policy> + '_ {
        self.policies
            .iter()
            .map(|(key, result)| Policy::new(key.clone(), result.clone()))
    }

    /// Policies whose key matches the filter (§ filter semantics: an `#`
    /// feature matches anything, everything else matches by equality).
    pub fn list(&self, filter: &PolicyKey) -> Vec<Policy> {
        self.iter()
            .filter(|policy| matches_filter(&policy.key, filter))
            .collect()
    }

    /// Remove every policy matching the filter; returns how many went away.
    pub fn erase(&mut self, filter: &PolicyKey) -> usize {
        let before = self.policies.len();
        let filter = filter.clone();
        self.policies.retain(|key, _| !matches_filter(key, &filter));
        before - self.policies.len()
    }
}

#[inline]
fn feature_matches_filter(feature: &str, filter: &str) -> bool {
    filter == ANY || feature == filter
}

/// Filter match for list/erase: `#` at a position accepts any stored
/// feature there, anything else (wildcard included) matches exactly.
pub fn matches_filter(key: &PolicyKey, filter: &PolicyKey) -> bool {
    feature_matches_filter(&key.client, &filter.client)
        && feature_matches_filter(&key.user, &filter.user)
        && feature_matches_filter(&key.privilege, &filter.privilege)
}

/// The candidate keys a literal query can be stored under: each position is
/// either the queried literal or the wildcard, 2^3 variants in total.
pub fn key_variants(key: &PolicyKey) -> [PolicyKey; 8] {
    let w = || warden_core::SharedStr::from(WILDCARD);
    let c = || key.client.clone();
    let u = || key.user.clone();
    let p = || key.privilege.clone();

    [
        PolicyKey::new(c(), u(), p()),
        PolicyKey::new(w(), u(), p()),
        PolicyKey::new(c(), w(), p()),
        PolicyKey::new(c(), u(), w()),
        PolicyKey::new(w(), w(), p()),
        PolicyKey::new(w(), u(), w()),
        PolicyKey::new(c(), w(), w()),
        PolicyKey::new(w(), w(), w()),
    ]
}
