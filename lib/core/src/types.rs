use crate::shared::SharedStr;
use std::fmt;

/// Identifier of a policy bucket. The empty string names the root bucket.
pub type BucketId = SharedStr;

/// The root bucket id. Always present, never deletable.
pub const ROOT_BUCKET: &str = "";

/// A key feature matching any literal value.
pub const WILDCARD: &str = "*";

/// A key feature matching literal or wildcard; only legal in filters.
pub const ANY: &str = "#";

/// 16-bit policy type tag. The predefined tags carry the comparison law
/// `DENY < NONE < ALLOW`; everything else below `BUCKET` is plugin-defined
/// and compared by numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyType(pub u16);

impl PolicyType {
    pub const DENY: PolicyType = PolicyType(0);
    pub const NONE: PolicyType = PolicyType(1);
    pub const ALLOW: PolicyType = PolicyType(2);
    pub const BUCKET: PolicyType = PolicyType(0xFFFE);
    pub const DELETE: PolicyType = PolicyType(0xFFFF);

    #[inline]
    pub fn is_predefined(self) -> bool {
        self <= Self::ALLOW || self == Self::BUCKET || self == Self::DELETE
    }

    /// Plugin-defined tags live between the comparison-law triple and the
    /// two administrative markers.
    #[inline]
    pub fn is_plugin_defined(self) -> bool {
        !self.is_predefined()
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// The `(client, user, privilege)` triple checks are keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyKey {
    pub client: SharedStr,
    pub user: SharedStr,
    pub privilege: SharedStr,
}

impl PolicyKey {
    #[inline]
    pub fn new<C, U, P>(client: C, user: U, privilege: P) -> PolicyKey
    where
        C: Into<SharedStr>,
        U: Into<SharedStr>,
        P: Into<SharedStr>,
    {
        PolicyKey {
            client: client.into(),
            user: user.into(),
            privilege: privilege.into(),
        }
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{};{};{}", self.client, self.user, self.privilege)
    }
}

/// Outcome of evaluating a policy: a type tag plus free-form metadata whose
/// meaning depends on the tag (bucket id for `BUCKET`, opaque data for
/// plugin types, empty otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResult {
    policy_type: PolicyType,
    metadata: SharedStr,
}

impl PolicyResult {
    #[inline]
    pub fn new<M: Into<SharedStr>>(policy_type: PolicyType, metadata: M) -> PolicyResult {
        PolicyResult {
            policy_type,
            metadata: metadata.into(),
        }
    }

    #[inline]
    pub fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    #[inline]
    pub fn metadata(&self) -> &SharedStr {
        &self.metadata
    }
}

impl From<PolicyType> for PolicyResult {
    #[inline]
    fn from(policy_type: PolicyType) -> PolicyResult {
        PolicyResult::new(policy_type, "")
    }
}

/// A single stored rule: key plus result, unique by key within its bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub key: PolicyKey,
    pub result: PolicyResult,
}

impl Policy {
    #[inline]
    pub fn new(key: PolicyKey, result: PolicyResult) -> Policy {
        Policy { key, result }
    }
}

/// Coarse realtime timestamp attached to monitor entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: i64,
}

/// One audited decision, produced by the resolver and consumed by
/// monitor-get subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEntry {
    pub key: PolicyKey,
    pub result: i32,
    pub timestamp: Timestamp,
}
