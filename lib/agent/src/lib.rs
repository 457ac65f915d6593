//! Agent library: out-of-process handlers register here for an agent type
//! and serve delegated checks pushed by the service. Fetching work blocks;
//! another thread may interrupt the wait through a wake handle. This is the
//! one sanctioned cross-thread interaction in the client stack.

use mio::net::UnixStream;
use mio::{Events, Interest, Poll, Token, Waker};
use slog::{debug, info, o, Logger};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use warden_core::{paths, ApiCode};
use warden_wire::dialect::agent as codec;
use warden_wire::messages::{AgentAction, AgentOp, AgentReply, AgentRequest, WireCode};
use warden_wire::BinaryQueue;

const SOCKET: Token = Token(0);
const WAKE: Token = Token(1);

/// One unit of delegated work: a fresh action to evaluate, or the
/// cancellation of one handed out earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentWork {
    pub action: AgentAction,
    pub check_id: u16,
    pub data: String,
}

pub struct AgentConfig {
    pub socket_path: PathBuf,
    pub agent_type: String,
}

impl AgentConfig {
    pub fn new<T: Into<String>>(agent_type: T) -> AgentConfig {
        AgentConfig {
            socket_path: paths::agent_socket(),
            agent_type: agent_type.into(),
        }
    }
}

/// Wakes a blocked `get_request` from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    waker: Arc<Waker>,
}

impl CancelHandle {
    pub fn cancel_waiting(&self) {
        let _ = self.waker.wake();
    }
}

pub struct AgentClient {
    poll: Poll,
    events: Events,
    stream: UnixStream,
    queue: BinaryQueue,
    waker: Arc<Waker>,
    last_seq: u16,
    log: Logger,
}

impl AgentClient {
    /// Connect to the agent socket and claim the agent type. Exactly one
    /// agent per type is accepted; a second one is rejected.
    pub fn connect(config: AgentConfig, log: &Logger) -> Result<AgentClient, ApiCode> {
        let log = log.new(o!("module" => "agent", "agent_type" => config.agent_type.clone()));

        let poll = Poll::new().map_err(|_| ApiCode::UnknownError)?;
        let waker =
            Arc::new(Waker::new(poll.registry(), WAKE).map_err(|_| ApiCode::UnknownError)?);

        let mut stream = UnixStream::connect(&config.socket_path)
            .map_err(|_| ApiCode::ServiceNotAvailable)?;
        poll.registry()
            .register(&mut stream, SOCKET, Interest::READABLE | Interest::WRITABLE)
            .map_err(|_| ApiCode::UnknownError)?;

        let mut client = AgentClient {
            poll,
            events: Events::with_capacity(16),
            stream,
            queue: BinaryQueue::new(),
            waker,
            last_seq: 0,
            log,
        };

        // The stream is nonblocking; make sure the connect has settled
        // before the registration round trip.
        client
            .wait_writable()
            .map_err(|_| ApiCode::ServiceNotAvailable)?;
        client.register(&config.agent_type)?;
        Ok(client)
    }

    fn register(&mut self, agent_type: &str) -> Result<(), ApiCode> {
        let request = AgentRequest {
            seq: 0,
            op: AgentOp::Register {
                agent_type: agent_type.to_string(),
            },
        };
        self.send_frame(&codec::encode_request(&request))
            .map_err(|_| ApiCode::ServiceNotAvailable)?;

        loop {
            match self.next_message(false)? {
                Message::Reply(AgentReply::Register(WireCode::Success)) => {
                    info!(self.log, "agent registered");
                    return Ok(());
                }
                Message::Reply(AgentReply::Register(WireCode::Rejected)) => {
                    return Err(ApiCode::OperationNotAllowed);
                }
                Message::Reply(AgentReply::Register(_)) => {
                    return Err(ApiCode::OperationFailed);
                }
                Message::Reply(_) => continue,
                Message::Interrupted => continue,
            }
        }
    }

    /// A handle other threads may use to break a blocked `get_request`.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            waker: self.waker.clone(),
        }
    }

    /// Block until the service pushes work (or a cancellation of earlier
    /// work), or until `cancel_waiting` interrupts the wait.
    pub fn get_request(&mut self) -> Result<AgentWork, ApiCode> {
        loop {
            match self.next_message(true)? {
                Message::Reply(AgentReply::Action { action, data }) => {
                    let check_id = self.last_seq;
                    debug!(self.log, "work received";
                           "check_id" => check_id, "action" => ?action);
                    return Ok(AgentWork {
                        action,
                        check_id,
                        data,
                    });
                }
                Message::Reply(_) => continue,
                Message::Interrupted => return Err(ApiCode::Interrupted),
            }
        }
    }

    /// Send the answer for a check handed out by `get_request`.
    pub fn put_response(&mut self, check_id: u16, data: String) -> Result<(), ApiCode> {
        let request = AgentRequest {
            seq: check_id,
            op: AgentOp::Action {
                action: AgentAction::Action,
                data,
            },
        };

        self.send_frame(&codec::encode_request(&request))
            .map_err(|_| ApiCode::ServiceNotAvailable)
    }

    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut written = 0;

        while written < frame.len() {
            match (&self.stream).write(&frame[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => written += count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.wait_writable()?;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn wait_writable(&mut self) -> io::Result<()> {
        // Re-arm readiness so an already-writable socket reports again.
        self.poll
            .registry()
            .reregister(&mut self.stream, SOCKET, Interest::READABLE | Interest::WRITABLE)?;

        loop {
            self.poll.poll(&mut self.events, None)?;
            for event in self.events.iter() {
                if event.token() == SOCKET && event.is_writable() {
                    return Ok(());
                }
            }
        }
    }
}

enum Message {
    Reply(AgentReply),
    Interrupted,
}

impl AgentClient {
    /// Pull the next decoded message off the socket, blocking. With
    /// `interruptible`, a waker event surfaces as `Interrupted`.
    fn next_message(&mut self, interruptible: bool) -> Result<Message, ApiCode> {
        loop {
            match codec::extract_response(&mut self.queue) {
                Ok(Some(response)) => {
                    self.last_seq = response.seq;
                    return Ok(Message::Reply(response.reply));
                }
                Ok(None) => {}
                Err(_) => return Err(ApiCode::UnknownError),
            }

            self.poll
                .poll(&mut self.events, None)
                .map_err(|_| ApiCode::UnknownError)?;

            let mut woken = false;
            let mut readable = false;
            for event in self.events.iter() {
                match event.token() {
                    WAKE => woken = true,
                    SOCKET if event.is_readable() => readable = true,
                    _ => {}
                }
            }

            if woken && interruptible {
                return Ok(Message::Interrupted);
            }

            if readable {
                match self.queue.ingress(&self.stream) {
                    Ok(_) => {}
                    Err(_) => return Err(ApiCode::ServiceNotAvailable),
                }
            }
        }
    }
}
