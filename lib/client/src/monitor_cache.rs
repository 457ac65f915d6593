use warden_core::time::coarse_realtime;
use warden_core::types::Timestamp;
use warden_core::{ApiCode, MonitorEntry, PolicyKey};

pub const CACHE_CAPACITY: usize = 100;
pub const MAX_ENTRY_AGE_SECS: i64 = 120;

/// Client-side buffer of per-decision monitor entries. Filled on every
/// check; drained to the service as a fire-and-forget push once it grows
/// past capacity or its oldest entry past the age limit.
pub struct MonitorCache {
    entries: Vec<MonitorEntry>,
}

impl MonitorCache {
    pub fn new() -> MonitorCache {
        MonitorCache {
            entries: Vec::new(),
        }
    }

    pub fn update(&mut self, key: PolicyKey, code: ApiCode) {
        self.update_at(key, code, coarse_realtime());
    }

    fn update_at(&mut self, key: PolicyKey, code: ApiCode, timestamp: Timestamp) {
        // Anything but an explicit allow is recorded as a denial.
        let result = if code == ApiCode::AccessAllowed {
            ApiCode::AccessAllowed
        } else {
            ApiCode::AccessDenied
        };

        self.entries.push(MonitorEntry {
            key,
            result: result.as_raw(),
            timestamp,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn should_flush(&self) -> bool {
        self.should_flush_at(coarse_realtime())
    }

    fn should_flush_at(&self, now: Timestamp) -> bool {
        match self.entries.first() {
            Some(oldest) => {
                self.entries.len() >= CACHE_CAPACITY
                    || now.secs - oldest.timestamp.secs >= MAX_ENTRY_AGE_SECS
            }
            None => false,
        }
    }

    pub fn drain(&mut self) -> Vec<MonitorEntry> {
        std::mem::replace(&mut self.entries, Vec::new())
    }
}

impl Default for MonitorCache {
    fn default() -> MonitorCache {
        MonitorCache::new()
    }
}
