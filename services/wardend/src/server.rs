use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::link::{Link, LinkId, LinkKind, Outbox};
use crate::signals;
use mio::net::UnixListener;
use mio::{Events, Interest, Poll, Token};
use slog::{debug, error, info, o, warn, Logger};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_wire::dialect::{
    admin as admin_codec, agent as agent_codec, client as client_codec, monitor as monitor_codec,
};
use warden_wire::messages::{AdminRequest, AgentRequest, ClientRequest, MonitorRequest};

const LISTENER_COUNT: usize = 4;
const LINK_BASE: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

enum AnyRequest {
    Client(ClientRequest),
    Admin(AdminRequest),
    Agent(AgentRequest),
    Monitor(MonitorRequest),
}

/// The readiness loop over the four accepting sockets and every live
/// connection. Single-threaded: all storage, plugin, agent and monitor
/// work happens here, between poll wakeups.
pub struct Server {
    poll: Poll,
    events: Events,
    listeners: Vec<(UnixListener, LinkKind)>,
    links: Vec<Option<Link>>,
    free: Vec<LinkId>,
    socket_files: Vec<PathBuf>,
    dispatcher: Dispatcher,
    log: Logger,
}

impl Server {
    pub fn bind(config: &Config, dispatcher: Dispatcher, log: &Logger) -> io::Result<Server> {
        let log = log.new(o!("module" => "server"));
        let poll = Poll::new()?;

        let sockets = [
            (config.client_socket(), LinkKind::Client),
            (config.admin_socket(), LinkKind::Admin),
            (config.agent_socket(), LinkKind::Agent),
            (config.monitor_socket(), LinkKind::Monitor),
        ];

        let mut listeners = Vec::with_capacity(LISTENER_COUNT);
        let mut socket_files = Vec::with_capacity(LISTENER_COUNT);

        for (index, (path, kind)) in sockets.iter().enumerate() {
            let mut listener = bind_socket(path)?;
            poll.registry()
                .register(&mut listener, Token(index), Interest::READABLE)?;

            info!(log, "listening"; "socket" => %path.display(), "dialect" => ?kind);
            listeners.push((listener, *kind));
            socket_files.push(path.clone());
        }

        Ok(Server {
            poll,
            events: Events::with_capacity(1024),
            listeners,
            links: Vec::new(),
            free: Vec::new(),
            socket_files,
            dispatcher,
            log,
        })
    }

    pub fn run(&mut self) {
        info!(self.log, "service running");

        loop {
            if let Err(err) = self.poll.poll(&mut self.events, Some(POLL_INTERVAL)) {
                if err.kind() != io::ErrorKind::Interrupted {
                    error!(self.log, "poll failed"; "error" => %err);
                    break;
                }
                if signals::shutdown_requested() {
                    info!(self.log, "termination signal received");
                    break;
                }
                continue;
            }

            if signals::shutdown_requested() {
                info!(self.log, "termination signal received");
                break;
            }

            let actions: Vec<(Token, bool, bool)> = self
                .events
                .iter()
                .map(|event| (event.token(), event.is_readable(), event.is_writable()))
                .collect();

            let mut out = Outbox::new();

            for (token, readable, writable) in actions {
                let Token(raw) = token;

                if raw < LISTENER_COUNT {
                    self.accept_all(raw);
                } else if raw >= LINK_BASE {
                    let id = raw - LINK_BASE;
                    if readable {
                        self.read_link(id, &mut out);
                    }
                    if writable {
                        self.flush_link(id, &mut out);
                    }
                }
            }

            self.dispatcher.tick(&mut out);
            self.deliver(&mut out);
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        for id in 0..self.links.len() {
            let mut out = Outbox::new();
            // Best-effort flush of whatever is still queued.
            self.flush_link(id, &mut out);
            self.close_link(id, &mut out);
        }

        for path in &self.socket_files {
            let _ = fs::remove_file(path);
        }

        info!(self.log, "service stopped");
    }

    fn accept_all(&mut self, index: usize) {
        loop {
            let (mut stream, _) = match self.listeners[index].0.accept() {
                Ok(pair) => pair,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(self.log, "accept failed"; "error" => %err);
                    break;
                }
            };
            let kind = self.listeners[index].1;

            let id = match self.free.pop() {
                Some(id) => id,
                None => {
                    self.links.push(None);
                    self.links.len() - 1
                }
            };

            let register = self.poll.registry().register(
                &mut stream,
                Token(LINK_BASE + id),
                Interest::READABLE | Interest::WRITABLE,
            );

            if let Err(err) = register {
                warn!(self.log, "connection registration failed"; "error" => %err);
                self.free.push(id);
                continue;
            }

            debug!(self.log, "connection accepted"; "link" => id, "dialect" => ?kind);
            self.links[id] = Some(Link::new(kind, stream));
        }
    }

    fn read_link(&mut self, id: LinkId, out: &mut Outbox) {
        {
            let link = match self.links.get_mut(id) {
                Some(Some(link)) => link,
                _ => return,
            };

            if let Err(err) = link.read_queue.ingress(&link.stream) {
                debug!(self.log, "connection closed"; "link" => id, "reason" => %err);
                self.close_link(id, out);
                return;
            }
        }

        self.drain_requests(id, out);
    }

    fn drain_requests(&mut self, id: LinkId, out: &mut Outbox) {
        loop {
            let extracted = {
                let link = match self.links.get_mut(id) {
                    Some(Some(link)) => link,
                    _ => return,
                };

                match link.kind {
                    LinkKind::Client => client_codec::extract_request(&mut link.read_queue)
                        .map(|message| message.map(AnyRequest::Client)),
                    LinkKind::Admin => admin_codec::extract_request(&mut link.read_queue)
                        .map(|message| message.map(AnyRequest::Admin)),
                    LinkKind::Agent => agent_codec::extract_request(&mut link.read_queue)
                        .map(|message| message.map(AnyRequest::Agent)),
                    LinkKind::Monitor => monitor_codec::extract_request(&mut link.read_queue)
                        .map(|message| message.map(AnyRequest::Monitor)),
                }
            };

            match extracted {
                Ok(Some(request)) => match request {
                    AnyRequest::Client(request) => {
                        self.dispatcher.handle_client(id, request, out)
                    }
                    AnyRequest::Admin(request) => self.dispatcher.handle_admin(id, request, out),
                    AnyRequest::Agent(request) => self.dispatcher.handle_agent(id, request, out),
                    AnyRequest::Monitor(request) => {
                        self.dispatcher.handle_monitor(id, request, out)
                    }
                },
                Ok(None) => return,
                Err(err) => {
                    // Protocol violation: drop the connection, no reply.
                    warn!(self.log, "protocol violation"; "link" => id, "error" => ?err);
                    self.close_link(id, out);
                    return;
                }
            }
        }
    }

    fn flush_link(&mut self, id: LinkId, out: &mut Outbox) {
        let result = match self.links.get_mut(id) {
            Some(Some(link)) => {
                if link.write_queue.is_empty() {
                    return;
                }
                link.write_queue.egress(&link.stream)
            }
            _ => return,
        };

        if let Err(err) = result {
            debug!(self.log, "write failed"; "link" => id, "error" => %err);
            self.close_link(id, out);
        }
    }

    fn close_link(&mut self, id: LinkId, out: &mut Outbox) {
        let mut link = match self.links.get_mut(id) {
            Some(slot) => match slot.take() {
                Some(link) => link,
                None => return,
            },
            None => return,
        };

        let _ = self.poll.registry().deregister(&mut link.stream);
        self.free.push(id);

        debug!(self.log, "connection closed"; "link" => id, "dialect" => ?link.kind);
        self.dispatcher.on_disconnect(id, link.kind, out);
    }

    /// Move dispatcher output onto the wire. Closing a link can generate
    /// more output (cancellations, denials), so loop until quiet.
    fn deliver(&mut self, out: &mut Outbox) {
        while !out.is_empty() {
            let mut touched = Vec::new();

            for (id, frame) in out.take_frames() {
                if let Some(Some(link)) = self.links.get_mut(id) {
                    link.write_queue.append(&frame);
                    touched.push(id);
                }
            }

            for id in touched {
                self.flush_link(id, out);
            }

            for id in out.take_closes() {
                self.close_link(id, out);
            }
        }
    }
}

fn bind_socket(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // A leftover socket file from a previous run would make bind fail.
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    UnixListener::bind(path)
}
