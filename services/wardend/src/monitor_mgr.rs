use crate::link::{LinkId, Outbox};
use hashbrown::HashMap;
use slog::{debug, o, Logger};
use warden_core::time::coarse_realtime;
use warden_core::types::Timestamp;
use warden_core::{ApiCode, MonitorEntry, PolicyKey, PolicyResult, PolicyType};
use warden_wire::dialect::monitor as codec;
use warden_wire::messages::{MonitorReply, MonitorResponse};

pub const BUFFER_CAPACITY: usize = 100;
pub const MAX_ENTRY_AGE_SECS: i64 = 120;

struct Subscriber {
    seq: u16,
    capacity: u16,
}

/// Service-side monitor pipeline: buffers one entry per decision and fans
/// the buffer out to every waiting monitor-get link once it runs full,
/// its oldest entry ages out, or a subscriber demands a flush. With nobody
/// subscribed a flushed buffer is dropped to bound memory.
pub struct MonitorManager {
    entries: Vec<MonitorEntry>,
    waiting: HashMap<LinkId, Subscriber>,
    log: Logger,
}

impl MonitorManager {
    pub fn new(log: &Logger) -> MonitorManager {
        MonitorManager {
            entries: Vec::new(),
            waiting: HashMap::new(),
            log: log.new(o!("module" => "monitor")),
        }
    }

    /// Record a decision made on behalf of a client.
    pub fn record(&mut self, key: &PolicyKey, result: &PolicyResult, out: &mut Outbox) {
        self.record_at(key, result, coarse_realtime(), out);
    }

    fn record_at(
        &mut self,
        key: &PolicyKey,
        result: &PolicyResult,
        now: Timestamp,
        out: &mut Outbox,
    ) {
        let code = if result.policy_type() == PolicyType::ALLOW {
            ApiCode::AccessAllowed
        } else {
            ApiCode::AccessDenied
        };

        self.entries.push(MonitorEntry {
            key: key.clone(),
            result: code.as_raw(),
            timestamp: now,
        });

        if self.due(now) {
            self.flush(out);
        }
    }

    fn due(&self, now: Timestamp) -> bool {
        match self.entries.first() {
            Some(oldest) => {
                self.entries.len() >= BUFFER_CAPACITY
                    || now.secs - oldest.timestamp.secs >= MAX_ENTRY_AGE_SECS
            }
            None => false,
        }
    }

    /// Take in entries a client library recorded on its own side and
    /// pushed over the wire.
    pub fn absorb(&mut self, entries: Vec<MonitorEntry>, out: &mut Outbox) {
        self.entries.extend(entries);

        if self.due(coarse_realtime()) {
            self.flush(out);
        }
    }

    /// A monitor-get link waits for the next batch. A backlog at or above
    /// the requested capacity is served immediately.
    pub fn subscribe(&mut self, link: LinkId, seq: u16, capacity: u16, out: &mut Outbox) {
        self.waiting.insert(link, Subscriber { seq, capacity });

        if capacity != 0 && self.entries.len() >= capacity as usize {
            self.flush(out);
        }
    }

    pub fn unsubscribe(&mut self, link: LinkId) {
        self.waiting.remove(&link);
    }

    /// Deliver the buffered batch to every waiting subscriber (capped to
    /// what each asked for) and clear it.
    pub fn flush(&mut self, out: &mut Outbox) {
        if self.waiting.is_empty() {
            debug!(self.log, "no monitor subscriber, dropping entries";
                   "count" => self.entries.len());
            self.entries.clear();
            return;
        }

        let batch = std::mem::replace(&mut self.entries, Vec::new());

        for (link, subscriber) in self.waiting.drain() {
            let cap = if subscriber.capacity == 0 {
                batch.len()
            } else {
                (subscriber.capacity as usize).min(batch.len())
            };

            let response = MonitorResponse {
                seq: subscriber.seq,
                reply: MonitorReply::Entries(batch[..cap].to_vec()),
            };
            out.push(link, codec::encode_response(&response));
        }
    }

    /// Periodic age check driven by the event loop.
    pub fn tick(&mut self, out: &mut Outbox) {
        if self.due(coarse_realtime()) {
            self.flush(out);
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::logging;
    use warden_wire::BinaryQueue;

    fn at(secs: i64) -> Timestamp {
        Timestamp { secs, nanos: 0 }
    }

    fn key() -> PolicyKey {
        PolicyKey::new("c", "u", "p")
    }

    fn deny() -> PolicyResult {
        PolicyResult::from(PolicyType::DENY)
    }

    fn decode_entries(frame: &[u8]) -> (u16, Vec<MonitorEntry>) {
        let mut queue = BinaryQueue::new();
        queue.append(frame);
        let response = codec::extract_response(&mut queue).unwrap().unwrap();
        let MonitorReply::Entries(entries) = response.reply;
        (response.seq, entries)
    }

    #[test]
    fn test_buffer_dropped_without_subscriber() {
        let mut manager = MonitorManager::new(&logging::discard());
        let mut out = Outbox::new();

        for _ in 0..BUFFER_CAPACITY {
            manager.record_at(&key(), &deny(), at(0), &mut out);
        }

        assert!(out.is_empty());
        assert_eq!(manager.buffered(), 0);
    }

    #[test]
    fn test_size_trigger_fans_out() {
        let mut manager = MonitorManager::new(&logging::discard());
        let mut out = Outbox::new();

        manager.subscribe(7, 3, 0, &mut out);
        manager.subscribe(8, 5, 10, &mut out);

        for _ in 0..BUFFER_CAPACITY {
            manager.record_at(&key(), &deny(), at(0), &mut out);
        }

        let frames = out.take_frames();
        assert_eq!(frames.len(), 2);

        for (link, frame) in frames {
            let (seq, entries) = decode_entries(&frame);
            match link {
                7 => {
                    assert_eq!(seq, 3);
                    assert_eq!(entries.len(), BUFFER_CAPACITY);
                }
                8 => {
                    assert_eq!(seq, 5);
                    assert_eq!(entries.len(), 10);
                }
                other => panic!("unexpected link {}", other),
            }
        }

        assert_eq!(manager.buffered(), 0);
    }

    #[test]
    fn test_age_trigger() {
        let mut manager = MonitorManager::new(&logging::discard());
        let mut out = Outbox::new();

        manager.subscribe(7, 1, 0, &mut out);
        manager.record_at(&key(), &deny(), at(100), &mut out);
        assert!(out.is_empty());

        manager.record_at(&key(), &deny(), at(100 + MAX_ENTRY_AGE_SECS), &mut out);

        let frames = out.take_frames();
        assert_eq!(frames.len(), 1);
        let (_, entries) = decode_entries(&frames[0].1);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_backlog_served_on_subscribe() {
        let mut manager = MonitorManager::new(&logging::discard());
        let mut out = Outbox::new();

        manager.record_at(&key(), &deny(), at(0), &mut out);
        manager.record_at(&key(), &deny(), at(0), &mut out);

        manager.subscribe(7, 9, 2, &mut out);

        let frames = out.take_frames();
        assert_eq!(frames.len(), 1);
        let (seq, entries) = decode_entries(&frames[0].1);
        assert_eq!(seq, 9);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_decision_clamped_to_allow_or_deny() {
        let mut manager = MonitorManager::new(&logging::discard());
        let mut out = Outbox::new();

        manager.record_at(&key(), &PolicyResult::from(PolicyType::ALLOW), at(0), &mut out);
        manager.record_at(&key(), &PolicyResult::new(PolicyType(100), "m"), at(0), &mut out);

        manager.subscribe(7, 1, 0, &mut out);
        manager.flush(&mut out);

        let frames = out.take_frames();
        let (_, entries) = decode_entries(&frames[0].1);
        assert_eq!(entries[0].result, ApiCode::AccessAllowed.as_raw());
        assert_eq!(entries[1].result, ApiCode::AccessDenied.as_raw());
    }

    #[test]
    fn test_entries_absorbed_from_clients() {
        let mut manager = MonitorManager::new(&logging::discard());
        let mut out = Outbox::new();

        manager.absorb(
            vec![MonitorEntry {
                key: key(),
                result: ApiCode::AccessAllowed.as_raw(),
                timestamp: at(5),
            }],
            &mut out,
        );

        assert_eq!(manager.buffered(), 1);
    }
}
