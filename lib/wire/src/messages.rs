use warden_core::{BucketId, MonitorEntry, Policy, PolicyKey, PolicyResult};

/// Result codes carried inside admin `Code` and agent `Register` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WireCode {
    Success = 0,
    OperationNotAllowed = 1,
    OperationFailed = 2,
    BucketNotFound = 3,
    NoPolicy = 4,
    Rejected = 5,
    DatabaseCorrupted = 6,
}

impl WireCode {
    pub fn from_raw(raw: u16) -> Option<WireCode> {
        use self::WireCode::*;

        Some(match raw {
            0 => Success,
            1 => OperationNotAllowed,
            2 => OperationFailed,
            3 => BucketNotFound,
            4 => NoPolicy,
            5 => Rejected,
            6 => DatabaseCorrupted,
            _ => return None,
        })
    }
}

// --- client dialect ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOp {
    Check(PolicyKey),
    Cancel,
    SimpleCheck(PolicyKey),
    /// Fire-and-forget push of client-side monitor entries; never answered.
    MonitorEntriesPut(Vec<MonitorEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub seq: u16,
    pub op: ClientOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientReply {
    Check(PolicyResult),
    Cancel,
    SimpleCheck { code: i32, result: PolicyResult },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResponse {
    pub seq: u16,
    pub reply: ClientReply,
}

// --- admin dialect ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOp {
    Check {
        key: PolicyKey,
        start_bucket: BucketId,
        recursive: bool,
    },
    SetBucket {
        bucket: BucketId,
        default: PolicyResult,
    },
    RemoveBucket {
        bucket: BucketId,
    },
    SetPolicies {
        insert_or_update: Vec<(BucketId, Vec<Policy>)>,
        remove: Vec<(BucketId, Vec<PolicyKey>)>,
    },
    List {
        bucket: BucketId,
        filter: PolicyKey,
    },
    Erase {
        start_bucket: BucketId,
        recursive: bool,
        filter: PolicyKey,
    },
    ListDescriptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRequest {
    pub seq: u16,
    pub op: AdminOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminReply {
    Check(PolicyResult),
    List {
        policies: Vec<Policy>,
        bucket_valid: bool,
    },
    Code(WireCode),
    Descriptions(Vec<(u16, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResponse {
    pub seq: u16,
    pub reply: AdminReply,
}

// --- agent dialect ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AgentAction {
    Action = 0,
    Cancel = 1,
}

impl AgentAction {
    pub fn from_raw(raw: u8) -> Option<AgentAction> {
        match raw {
            0 => Some(AgentAction::Action),
            1 => Some(AgentAction::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOp {
    Register { agent_type: String },
    Action { action: AgentAction, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub seq: u16,
    pub op: AgentOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Register(WireCode),
    Action { action: AgentAction, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub seq: u16,
    pub reply: AgentReply,
}

// --- monitor-get dialect ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOp {
    GetEntries { capacity: u16 },
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRequest {
    pub seq: u16,
    pub op: MonitorOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorReply {
    Entries(Vec<MonitorEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorResponse {
    pub seq: u16,
    pub reply: MonitorReply,
}
