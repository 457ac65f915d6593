//! Monitor-get library: subscribes to the per-decision audit entries the
//! service buffers. `get_entries` blocks with an optional timeout; a second
//! concurrent call is refused, and another thread may interrupt the wait
//! through a wake handle, discarding any partial batch.

use mio::net::UnixStream;
use mio::{Events, Interest, Poll, Token, Waker};
use slog::{debug, o, Logger};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};
use warden_core::{paths, ApiCode, MonitorEntry};
use warden_wire::dialect::monitor as codec;
use warden_wire::messages::{MonitorOp, MonitorReply, MonitorRequest};
use warden_wire::BinaryQueue;

const SOCKET: Token = Token(0);
const WAKE: Token = Token(1);

pub struct MonitorConfig {
    pub socket_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> MonitorConfig {
        MonitorConfig {
            socket_path: paths::monitor_socket(),
        }
    }
}

/// Interrupts a blocked `get_entries` from another thread.
#[derive(Clone)]
pub struct InterruptHandle {
    waker: Arc<Waker>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        let _ = self.waker.wake();
    }
}

struct Receiver {
    poll: Poll,
    events: Events,
    queue: BinaryQueue,
    sequence: u16,
}

pub struct Monitor {
    stream: UnixStream,
    receiver: Mutex<Receiver>,
    sender: Mutex<()>,
    waker: Arc<Waker>,
    log: Logger,
}

impl Monitor {
    pub fn connect(config: MonitorConfig, log: &Logger) -> Result<Monitor, ApiCode> {
        let log = log.new(o!("module" => "monitor"));

        let poll = Poll::new().map_err(|_| ApiCode::UnknownError)?;
        let waker =
            Arc::new(Waker::new(poll.registry(), WAKE).map_err(|_| ApiCode::UnknownError)?);

        let mut stream = UnixStream::connect(&config.socket_path)
            .map_err(|_| ApiCode::ServiceNotAvailable)?;
        poll.registry()
            .register(&mut stream, SOCKET, Interest::READABLE)
            .map_err(|_| ApiCode::UnknownError)?;

        Ok(Monitor {
            stream,
            receiver: Mutex::new(Receiver {
                poll,
                events: Events::with_capacity(16),
                queue: BinaryQueue::new(),
                sequence: 0,
            }),
            sender: Mutex::new(()),
            waker,
            log,
        })
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            waker: self.waker.clone(),
        }
    }

    /// Block until the service flushes a batch of entries, the timeout
    /// elapses (empty batch), or another thread interrupts the wait
    /// (`Interrupted`, partial data discarded). Only one caller at a time;
    /// the mutex is not reentrant and a concurrent call is an error.
    pub fn get_entries(
        &self,
        capacity: u16,
        timeout: Option<Duration>,
    ) -> Result<Vec<MonitorEntry>, ApiCode> {
        let mut receiver = match self.receiver.try_lock() {
            Ok(receiver) => receiver,
            Err(TryLockError::WouldBlock) => return Err(ApiCode::OperationNotAllowed),
            Err(TryLockError::Poisoned(_)) => return Err(ApiCode::UnknownError),
        };

        receiver.sequence = receiver.sequence.wrapping_add(1);
        let seq = receiver.sequence;

        self.send(&codec::encode_request(&MonitorRequest {
            seq,
            op: MonitorOp::GetEntries { capacity },
        }))
        .map_err(|_| ApiCode::ServiceNotAvailable)?;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            match codec::extract_response(&mut receiver.queue) {
                Ok(Some(response)) => {
                    let MonitorReply::Entries(entries) = response.reply;
                    if response.seq != seq {
                        debug!(self.log, "dropping stale entries batch"; "seq" => response.seq);
                        continue;
                    }
                    return Ok(entries);
                }
                Ok(None) => {}
                Err(_) => return Err(ApiCode::UnknownError),
            }

            let poll_timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Vec::new());
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let receiver = &mut *receiver;
            receiver
                .poll
                .poll(&mut receiver.events, poll_timeout)
                .map_err(|_| ApiCode::UnknownError)?;

            let mut woken = false;
            let mut readable = false;
            for event in receiver.events.iter() {
                match event.token() {
                    WAKE => woken = true,
                    SOCKET if event.is_readable() => readable = true,
                    _ => {}
                }
            }

            if readable && receiver.queue.ingress(&self.stream).is_err() {
                return Err(ApiCode::ServiceNotAvailable);
            }

            if woken {
                // Whatever was partially received stays undelivered.
                return Err(ApiCode::Interrupted);
            }
        }
    }

    /// Ask the service to flush its entry buffer to every subscriber. Safe
    /// to call while another thread sits in `get_entries`; that is its
    /// main use.
    pub fn flush(&self) -> Result<(), ApiCode> {
        self.send(&codec::encode_request(&MonitorRequest {
            seq: 0,
            op: MonitorOp::Flush,
        }))
        .map_err(|_| ApiCode::ServiceNotAvailable)
    }

    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let _guard = self.sender.lock().map_err(|_| io::Error::from(io::ErrorKind::Other))?;
        let mut written = 0;

        while written < frame.len() {
            match (&self.stream).write(&frame[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => written += count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    // Frames here are tiny; yield and retry until the
                    // kernel buffer drains.
                    std::thread::yield_now();
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}
