use hashbrown::HashSet;
use warden_core::{PolicyKey, PolicyResult, SharedStr};

/// Deduplication table for key features and metadata. Clients repeat the
/// same client/user/privilege strings across thousands of policies, so the
/// database maps every incoming string onto one shared allocation. Owned by
/// the backend; there is no global table.
pub struct Interner {
    table: HashSet<SharedStr>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner {
            table: HashSet::new(),
        }
    }

    pub fn intern(&mut self, value: SharedStr) -> SharedStr {
        match self.table.get(&value) {
            Some(existing) => existing.clone(),
            None => {
                self.table.insert(value.clone());
                value
            }
        }
    }

    pub fn intern_key(&mut self, key: PolicyKey) -> PolicyKey {
        PolicyKey {
            client: self.intern(key.client),
            user: self.intern(key.user),
            privilege: self.intern(key.privilege),
        }
    }

    pub fn intern_result(&mut self, result: PolicyResult) -> PolicyResult {
        let policy_type = result.policy_type();
        let metadata = self.intern(result.metadata().clone());
        PolicyResult::new(policy_type, metadata)
    }

    /// Drop table entries no longer referenced outside the table itself.
    pub fn prune(&mut self) {
        self.table.retain(|value| value.ref_count() > 1);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

impl Default for Interner {
    fn default() -> Interner {
        Interner::new()
    }
}
