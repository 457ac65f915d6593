use std::io;

// Head space reclaimed lazily once this many consumed bytes accumulate.
const COMPACT_THRESHOLD: usize = 65536;

/// A dynamically sized buffered FIFO byte queue. Data is appended at the
/// tail and read from the head; `consume` advances the head after a frame
/// has been decoded.
pub struct BinaryQueue {
    data: Vec<u8>,
    head: usize,
}

impl BinaryQueue {
    #[inline]
    pub fn new() -> BinaryQueue {
        BinaryQueue {
            data: Vec::new(),
            head: 0,
        }
    }

    /// The number of unconsumed bytes in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slice containing the unconsumed data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[self.head..]
    }

    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Advance the head past `count` consumed bytes.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.head += count;

        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head >= COMPACT_THRESHOLD {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Read all currently available data from the supplied reader into the
    /// queue. Returns the number of bytes taken in; a would-block condition
    /// ends the read without error. A zero-length read means the peer has
    /// closed and surfaces as `UnexpectedEof`.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut chunk = [0u8; 8192];
        let mut total = 0;

        loop {
            match reader.read(&mut chunk) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(count) => {
                    self.append(&chunk[..count]);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Write the queue contents to the supplied writer, consuming whatever
    /// was accepted. A would-block condition ends the write without error.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut total = 0;

        while !self.is_empty() {
            match writer.write(self.data()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => {
                    self.consume(count);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }
}

impl Default for BinaryQueue {
    fn default() -> BinaryQueue {
        BinaryQueue::new()
    }
}
