use crate::buffer::BinaryQueue;
use crate::support::{WireError, WireResult};
use byteorder::{ByteOrder, LittleEndian};

pub const SIGNATURE: &[u8; 4] = b"CPv1";
pub const HEADER_SIZE: usize = 10;
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Decoded frame header: total frame length (header included) and the
/// sender's correlation sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub sequence: u16,
}

impl FrameHeader {
    /// Parse the header at the front of the queue without consuming it.
    /// Returns `Ok(None)` while fewer than `HEADER_SIZE` bytes are buffered.
    pub fn peek(queue: &BinaryQueue) -> WireResult<Option<FrameHeader>> {
        let data = queue.data();

        if data.len() < HEADER_SIZE {
            return Ok(None);
        }

        if &data[..4] != SIGNATURE {
            return Err(WireError::InvalidSignature);
        }

        let length = LittleEndian::read_u32(&data[4..8]);
        let sequence = LittleEndian::read_u16(&data[8..10]);

        if length < HEADER_SIZE as u32 {
            return Err(WireError::FrameTooShort(length));
        }
        if length > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(length));
        }

        Ok(Some(FrameHeader { length, sequence }))
    }
}

/// Take one complete frame off the queue, returning its sequence number and
/// payload (the bytes after the header). Leaves the queue untouched while
/// the frame is still incomplete.
pub fn extract_frame(queue: &mut BinaryQueue) -> WireResult<Option<(u16, Vec<u8>)>> {
    let header = match FrameHeader::peek(queue)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if queue.len() < header.length as usize {
        return Ok(None);
    }

    let payload = queue.data()[HEADER_SIZE..header.length as usize].to_vec();
    queue.consume(header.length as usize);

    Ok(Some((header.sequence, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::FrameWriter;

    #[test]
    fn test_peek_incomplete_header() {
        let mut queue = BinaryQueue::new();
        queue.append(b"CPv1\x0a\x00");

        assert_eq!(FrameHeader::peek(&queue).unwrap(), None);
    }

    #[test]
    fn test_peek_bad_signature() {
        let mut queue = BinaryQueue::new();
        queue.append(b"XXXX\x0a\x00\x00\x00\x01\x00");

        assert_eq!(
            FrameHeader::peek(&queue).unwrap_err(),
            WireError::InvalidSignature
        );
    }

    #[test]
    fn test_peek_undersize_length() {
        let mut queue = BinaryQueue::new();
        queue.append(b"CPv1\x02\x00\x00\x00\x01\x00");

        assert_eq!(
            FrameHeader::peek(&queue).unwrap_err(),
            WireError::FrameTooShort(2)
        );
    }

    #[test]
    fn test_extract_waits_for_body() {
        let mut writer = FrameWriter::new(7);
        writer.write_u32(0xAABBCCDD);
        let bytes = writer.finish();

        let mut queue = BinaryQueue::new();
        queue.append(&bytes[..bytes.len() - 1]);

        assert_eq!(extract_frame(&mut queue).unwrap(), None);
        // Nothing consumed while incomplete.
        assert_eq!(queue.len(), bytes.len() - 1);

        queue.append(&bytes[bytes.len() - 1..]);

        let (seq, payload) = extract_frame(&mut queue).unwrap().unwrap();
        assert_eq!(seq, 7);
        assert_eq!(payload, vec![0xDD, 0xCC, 0xBB, 0xAA]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_extract_two_frames_back_to_back() {
        let mut queue = BinaryQueue::new();

        for seq in 0..2u16 {
            let mut writer = FrameWriter::new(seq);
            writer.write_u8(seq as u8);
            queue.append(&writer.finish());
        }

        let (seq, payload) = extract_frame(&mut queue).unwrap().unwrap();
        assert_eq!((seq, payload), (0, vec![0]));

        let (seq, payload) = extract_frame(&mut queue).unwrap().unwrap();
        assert_eq!((seq, payload), (1, vec![1]));

        assert_eq!(extract_frame(&mut queue).unwrap(), None);
    }
}
