use crate::buffer::BinaryQueue;
use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

/// Blocking Unix stream client used by the synchronous libraries. Connects
/// lazily and buffers incoming bytes so the dialect extractors can pull
/// complete frames.
pub struct SocketClient {
    path: PathBuf,
    stream: Option<UnixStream>,
    queue: BinaryQueue,
}

impl SocketClient {
    pub fn new<P: Into<PathBuf>>(path: P) -> SocketClient {
        SocketClient {
            path: path.into(),
            stream: None,
            queue: BinaryQueue::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn connect(&mut self) -> io::Result<()> {
        if self.stream.is_none() {
            let stream = UnixStream::connect(&self.path)?;
            stream.set_read_timeout(None)?;
            self.stream = Some(stream);
            self.queue.clear();
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.queue.clear();
    }

    /// Push one encoded frame out, connecting first if needed.
    pub fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.connect()?;
        let stream = self.stream.as_mut().expect("connected stream");

        match stream.write_all(frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.disconnect();
                Err(err)
            }
        }
    }

    /// Block until more bytes arrive, then run the extractor over the
    /// receive queue. Loops until the extractor produces a message.
    pub fn receive<T, F>(&mut self, mut extract: F) -> io::Result<T>
    where
        F: FnMut(&mut BinaryQueue) -> io::Result<Option<T>>,
    {
        self.connect()?;
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(None)?;
        }

        loop {
            if let Some(message) = extract(&mut self.queue)? {
                return Ok(message);
            }

            let stream = self.stream.as_mut().expect("connected stream");
            let mut chunk = [0u8; 4096];
            let count = match io::Read::read(stream, &mut chunk) {
                Ok(0) => {
                    self.disconnect();
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(count) => count,
                Err(err) => {
                    if err.kind() != io::ErrorKind::Interrupted {
                        self.disconnect();
                        return Err(err);
                    }
                    continue;
                }
            };

            self.queue.append(&chunk[..count]);
        }
    }

    /// Like `receive`, but gives up once `timeout` elapses without a full
    /// message. `Ok(None)` means timeout.
    pub fn receive_timeout<T, F>(
        &mut self,
        timeout: Duration,
        mut extract: F,
    ) -> io::Result<Option<T>>
    where
        F: FnMut(&mut BinaryQueue) -> io::Result<Option<T>>,
    {
        self.connect()?;

        let deadline = std::time::Instant::now() + timeout;

        loop {
            if let Some(message) = extract(&mut self.queue)? {
                return Ok(Some(message));
            }

            let now = std::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let stream = self.stream.as_mut().expect("connected stream");
            stream.set_read_timeout(Some(deadline - now))?;

            let mut chunk = [0u8; 4096];
            match io::Read::read(stream, &mut chunk) {
                Ok(0) => {
                    self.disconnect();
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(count) => self.queue.append(&chunk[..count]),
                Err(err) => match err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        stream.set_read_timeout(None)?;
                        return Ok(None);
                    }
                    io::ErrorKind::Interrupted => continue,
                    _ => {
                        self.disconnect();
                        return Err(err);
                    }
                },
            }
        }
    }
}
