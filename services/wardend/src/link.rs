use warden_wire::BinaryQueue;

/// Opaque connection handle; an index into the server's link table.
pub type LinkId = usize;

/// Which accepting socket a connection arrived on, and therefore which
/// dialect it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Client,
    Admin,
    Agent,
    Monitor,
}

/// Frames waiting to leave the dispatcher, plus connections it decided to
/// drop. The event loop owns the sockets; the dispatcher only ever talks
/// through this.
pub struct Outbox {
    frames: Vec<(LinkId, Vec<u8>)>,
    closes: Vec<LinkId>,
}

impl Outbox {
    pub fn new() -> Outbox {
        Outbox {
            frames: Vec::new(),
            closes: Vec::new(),
        }
    }

    pub fn push(&mut self, link: LinkId, frame: Vec<u8>) {
        self.frames.push((link, frame));
    }

    pub fn close(&mut self, link: LinkId) {
        self.closes.push(link);
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.closes.is_empty()
    }

    pub fn take_frames(&mut self) -> Vec<(LinkId, Vec<u8>)> {
        std::mem::replace(&mut self.frames, Vec::new())
    }

    pub fn take_closes(&mut self) -> Vec<LinkId> {
        std::mem::replace(&mut self.closes, Vec::new())
    }
}

/// One accepted connection: its stream lives in the server table; here is
/// the buffered state shared with frame extraction.
pub struct Link {
    pub kind: LinkKind,
    pub stream: mio::net::UnixStream,
    pub read_queue: BinaryQueue,
    pub write_queue: BinaryQueue,
}

impl Link {
    pub fn new(kind: LinkKind, stream: mio::net::UnixStream) -> Link {
        Link {
            kind,
            stream,
            read_queue: BinaryQueue::new(),
            write_queue: BinaryQueue::new(),
        }
    }
}
