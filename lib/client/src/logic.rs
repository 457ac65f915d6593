use crate::cache::CapacityCache;
use crate::interpreter::NaiveInterpreter;
use crate::monitor_cache::MonitorCache;
use slog::{debug, o, warn, Logger};
use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use warden_core::{paths, ApiCode, PolicyKey};
use warden_plugin::loader::load_client_plugins;
use warden_plugin::{ClientPlugin, PluginRegistry};
use warden_wire::dialect::client as codec;
use warden_wire::messages::{ClientOp, ClientReply, ClientRequest, ClientResponse};
use warden_wire::transport::SocketClient;

const DEFAULT_CACHE_CAPACITY: usize = 8192;

pub struct ClientConfig {
    pub socket_path: PathBuf,
    pub cache_capacity: usize,
    pub plugin_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            socket_path: paths::client_socket(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            plugin_dir: Some(paths::client_plugin_dir()),
        }
    }
}

/// Synchronous checker. Consults the decision cache first, then round-trips
/// over the client socket; every decision also lands in the monitor-entry
/// buffer, which is pushed to the service on flush.
pub struct Client {
    socket: SocketClient,
    cache: CapacityCache,
    monitor: MonitorCache,
    sequence: u16,
    log: Logger,
}

impl Client {
    pub fn new(config: ClientConfig, log: &Logger) -> Client {
        let log = log.new(o!("module" => "client"));

        let mut plugins: PluginRegistry<dyn ClientPlugin> = PluginRegistry::new(log.clone());
        let interpreter: Rc<RefCell<Box<dyn ClientPlugin>>> =
            Rc::new(RefCell::new(Box::new(NaiveInterpreter)));
        plugins.register(interpreter.borrow().supported_descriptions(), interpreter.clone());
        if let Some(dir) = &config.plugin_dir {
            load_client_plugins(&mut plugins, dir, &log);
        }

        Client {
            socket: SocketClient::new(config.socket_path),
            cache: CapacityCache::new(config.cache_capacity, plugins, &log),
            monitor: MonitorCache::new(),
            sequence: 0,
            log,
        }
    }

    /// Is `client` operating as `user` permitted `privilege`? May suspend
    /// service-side on an agent; this call blocks until the decision.
    pub fn check(&mut self, session: &str, key: &PolicyKey) -> ApiCode {
        let cached = self.cache.get(session, key);
        if cached != ApiCode::CacheMiss {
            self.record_decision(key.clone(), cached);
            return cached;
        }

        let seq = self.next_sequence();
        let request = ClientRequest {
            seq,
            op: ClientOp::Check(key.clone()),
        };

        let reply = match self.round_trip(&request, seq) {
            Ok(ClientReply::Check(result)) => self.cache.update(session, key, result),
            Ok(_) => ApiCode::UnknownError,
            Err(code) => code,
        };

        self.record_decision(key.clone(), reply);
        reply
    }

    /// Check that never waits for an agent; plugin types the service cannot
    /// settle synchronously come back as `AccessNotResolved`.
    pub fn simple_check(&mut self, session: &str, key: &PolicyKey) -> ApiCode {
        let cached = self.cache.get(session, key);
        if cached != ApiCode::CacheMiss {
            self.record_decision(key.clone(), cached);
            return cached;
        }

        let seq = self.next_sequence();
        let request = ClientRequest {
            seq,
            op: ClientOp::SimpleCheck(key.clone()),
        };

        let reply = match self.round_trip(&request, seq) {
            Ok(ClientReply::SimpleCheck { code, result }) => {
                match ApiCode::from_raw(code) {
                    Some(ApiCode::Success) => self.cache.update(session, key, result),
                    Some(other) => other,
                    None => ApiCode::UnknownError,
                }
            }
            Ok(_) => ApiCode::UnknownError,
            Err(code) => code,
        };

        self.record_decision(key.clone(), reply);
        reply
    }

    fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// One request, one correlated response. A dropped connection is
    /// retried once before giving up with `ServiceNotAvailable`.
    fn round_trip(&mut self, request: &ClientRequest, seq: u16) -> Result<ClientReply, ApiCode> {
        let frame = codec::encode_request(request);

        for attempt in 0..2 {
            if attempt > 0 {
                self.socket.disconnect();
                self.cache.clear();
            }

            if self.socket.send(&frame).is_err() {
                continue;
            }

            match self.await_response(seq) {
                Ok(response) => return Ok(response.reply),
                Err(err) => {
                    debug!(self.log, "connection to service lost"; "error" => %err);
                    continue;
                }
            }
        }

        warn!(self.log, "service unreachable");
        Err(ApiCode::ServiceNotAvailable)
    }

    fn await_response(&mut self, seq: u16) -> io::Result<ClientResponse> {
        loop {
            let response = self.socket.receive(|queue| {
                codec::extract_response(queue)
                    .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))
            })?;

            if response.seq == seq {
                return Ok(response);
            }
            // A response for someone else's sequence number; not ours to
            // interpret on a synchronous connection.
            debug!(self.log, "dropping stray response"; "seq" => response.seq);
        }
    }

    /// Record into the monitor buffer and push it out when due. The push is
    /// fire-and-forget; failures only disconnect.
    fn record_decision(&mut self, key: PolicyKey, code: ApiCode) {
        self.monitor.update(key, code);

        if self.monitor.should_flush() {
            let entries = self.monitor.drain();
            let request = ClientRequest {
                seq: self.next_sequence(),
                op: ClientOp::MonitorEntriesPut(entries),
            };

            if self.socket.send(&codec::encode_request(&request)).is_err() {
                debug!(self.log, "monitor entries dropped, service unreachable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::logging;

    #[test]
    fn test_unreachable_service_yields_service_not_available() {
        let config = ClientConfig {
            socket_path: PathBuf::from("/nonexistent/warden.socket"),
            cache_capacity: 16,
            plugin_dir: None,
        };
        let mut client = Client::new(config, &logging::discard());

        assert_eq!(
            client.check("session", &PolicyKey::new("c", "u", "p")),
            ApiCode::ServiceNotAvailable
        );
    }
}
