use crate::cache::CapacityCache;
use crate::interpreter::NaiveInterpreter;
use slog::{debug, o, Logger};
use std::cell::RefCell;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::rc::Rc;
use warden_core::{paths, ApiCode, PolicyKey};
use warden_plugin::loader::load_client_plugins;
use warden_plugin::{ClientPlugin, PluginRegistry};
use warden_wire::dialect::client as codec;
use warden_wire::messages::{ClientOp, ClientReply, ClientRequest};
use warden_wire::sequence::SequenceContainer;
use warden_wire::BinaryQueue;

/// What the caller's event loop should watch the descriptor for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    ReadWrite,
}

pub type CheckCallback = Box<dyn FnOnce(u16, ApiCode)>;

struct PendingCheck {
    session: String,
    key: PolicyKey,
    /// None once the caller cancelled; a late response is then discarded.
    callback: Option<CheckCallback>,
}

pub struct AsyncConfig {
    pub socket_path: PathBuf,
    pub cache_capacity: usize,
    pub plugin_dir: Option<PathBuf>,
}

impl Default for AsyncConfig {
    fn default() -> AsyncConfig {
        AsyncConfig {
            socket_path: paths::client_socket(),
            cache_capacity: 8192,
            plugin_dir: Some(paths::client_plugin_dir()),
        }
    }
}

/// Event-loop-integrated checker. The caller owns the loop: it watches
/// `fd()` for the readiness in `interest()` and calls `process()` whenever
/// the descriptor wakes up. Requests are correlated by sequence numbers
/// from a bitset allocator, so up to 65536 checks can be in flight.
pub struct AsyncClient {
    stream: UnixStream,
    read_queue: BinaryQueue,
    write_queue: BinaryQueue,
    sequences: SequenceContainer,
    pending: hashbrown::HashMap<u16, PendingCheck>,
    cache: CapacityCache,
    log: Logger,
}

impl AsyncClient {
    pub fn connect(config: AsyncConfig, log: &Logger) -> io::Result<AsyncClient> {
        let log = log.new(o!("module" => "client-async"));

        let stream = UnixStream::connect(&config.socket_path)?;
        stream.set_nonblocking(true)?;

        let mut plugins: PluginRegistry<dyn ClientPlugin> = PluginRegistry::new(log.clone());
        let interpreter: Rc<RefCell<Box<dyn ClientPlugin>>> =
            Rc::new(RefCell::new(Box::new(NaiveInterpreter)));
        plugins.register(interpreter.borrow().supported_descriptions(), interpreter.clone());
        if let Some(dir) = &config.plugin_dir {
            load_client_plugins(&mut plugins, dir, &log);
        }

        Ok(AsyncClient {
            stream,
            read_queue: BinaryQueue::new(),
            write_queue: BinaryQueue::new(),
            sequences: SequenceContainer::new(),
            pending: hashbrown::HashMap::new(),
            cache: CapacityCache::new(config.cache_capacity, plugins, &log),
            log,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn interest(&self) -> Interest {
        if self.write_queue.is_empty() {
            Interest::Read
        } else {
            Interest::ReadWrite
        }
    }

    /// Cache-only lookup; never touches the wire.
    pub fn check_cache(&mut self, session: &str, key: &PolicyKey) -> ApiCode {
        self.cache.get(session, key)
    }

    /// Queue a check. The callback fires from a later `process()` call with
    /// the check id and the translated decision.
    pub fn create_request(
        &mut self,
        session: &str,
        key: &PolicyKey,
        callback: CheckCallback,
    ) -> Result<u16, ApiCode> {
        let seq = match self.sequences.acquire() {
            Some(seq) => seq,
            None => return Err(ApiCode::MaxPendingRequests),
        };

        let request = ClientRequest {
            seq,
            op: ClientOp::Check(key.clone()),
        };
        self.write_queue.append(&codec::encode_request(&request));

        self.pending.insert(
            seq,
            PendingCheck {
                session: session.to_string(),
                key: key.clone(),
                callback: Some(callback),
            },
        );

        // Push out what the socket will take right now.
        let _ = self.flush_writes();

        Ok(seq)
    }

    /// Drop the callback of an in-flight check and tell the service. The
    /// sequence number stays claimed until the service acknowledges, so it
    /// cannot be handed to a new request early.
    pub fn cancel_request(&mut self, check_id: u16) {
        let pending = match self.pending.get_mut(&check_id) {
            Some(pending) => pending,
            None => return,
        };

        if pending.callback.take().is_some() {
            let request = ClientRequest {
                seq: check_id,
                op: ClientOp::Cancel,
            };
            self.write_queue.append(&codec::encode_request(&request));
            let _ = self.flush_writes();
        }
    }

    /// Drive the connection: read what arrived, dispatch responses, write
    /// what fits. Call on every readiness event.
    pub fn process(&mut self) -> Result<(), ApiCode> {
        if self.read_queue.ingress(&mut self.stream).is_err() {
            return Err(self.fail_all());
        }

        loop {
            let response = match codec::extract_response(&mut self.read_queue) {
                Ok(Some(response)) => response,
                Ok(None) => break,
                Err(_) => return Err(self.fail_all()),
            };

            match response.reply {
                ClientReply::Check(result) => {
                    if let Some(pending) = self.pending.remove(&response.seq) {
                        self.sequences.release(response.seq);
                        match pending.callback {
                            Some(callback) => {
                                let code =
                                    self.cache.update(&pending.session, &pending.key, result);
                                callback(response.seq, code);
                            }
                            None => {
                                debug!(self.log, "late response for cancelled check";
                                       "seq" => response.seq);
                            }
                        }
                    }
                }
                ClientReply::Cancel => {
                    let cancelled = self
                        .pending
                        .get(&response.seq)
                        .map(|pending| pending.callback.is_none())
                        .unwrap_or(false);

                    if cancelled {
                        self.pending.remove(&response.seq);
                        self.sequences.release(response.seq);
                    }
                }
                ClientReply::SimpleCheck { .. } => {
                    debug!(self.log, "unexpected simple-check response"; "seq" => response.seq);
                }
            }
        }

        if self.flush_writes().is_err() {
            return Err(self.fail_all());
        }

        Ok(())
    }

    fn flush_writes(&mut self) -> io::Result<usize> {
        self.write_queue.egress(&mut self.stream)
    }

    /// Connection gone: every still-callbacked check learns the service is
    /// unavailable, everything else is dropped.
    fn fail_all(&mut self) -> ApiCode {
        debug!(self.log, "connection to service lost, failing pending checks";
               "pending" => self.pending.len());

        for (seq, pending) in self.pending.drain() {
            if let Some(callback) = pending.callback {
                callback(seq, ApiCode::ServiceNotAvailable);
            }
        }

        self.sequences.clear();
        self.cache.clear();
        self.write_queue.clear();
        self.read_queue.clear();

        ApiCode::ServiceNotAvailable
    }
}
