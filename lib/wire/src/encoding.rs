use crate::frame::{HEADER_SIZE, SIGNATURE};
use crate::support::{WireError, WireResult};
use byteorder::{ByteOrder, LittleEndian};
use warden_core::types::Timestamp;
use warden_core::{MonitorEntry, PolicyKey, PolicyResult, PolicyType};

pub const MAX_STRING_LEN: u32 = 16 * 1024;
pub const MAX_VECTOR_LEN: u32 = 65536;

/// Builds one complete frame: signature, patched total length, sequence
/// number, then whatever fields the dialect appends.
pub struct FrameWriter {
    out: Vec<u8>,
}

impl FrameWriter {
    pub fn new(sequence: u16) -> FrameWriter {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&[0; 4]);
        let mut seq = [0; 2];
        LittleEndian::write_u16(&mut seq, sequence);
        out.extend_from_slice(&seq);

        FrameWriter { out }
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.out.push(value);
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        let mut raw = [0; 2];
        LittleEndian::write_u16(&mut raw, value);
        self.out.extend_from_slice(&raw);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        let mut raw = [0; 4];
        LittleEndian::write_u32(&mut raw, value);
        self.out.extend_from_slice(&raw);
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        let mut raw = [0; 8];
        LittleEndian::write_i64(&mut raw, value);
        self.out.extend_from_slice(&raw);
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.out.push(value as u8);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.out.extend_from_slice(value.as_bytes());
    }

    pub fn write_count(&mut self, count: usize) {
        self.write_u32(count as u32);
    }

    pub fn write_key(&mut self, key: &PolicyKey) {
        self.write_string(&key.client);
        self.write_string(&key.user);
        self.write_string(&key.privilege);
    }

    pub fn write_result(&mut self, result: &PolicyResult) {
        self.write_u16(result.policy_type().0);
        self.write_string(result.metadata());
    }

    pub fn write_monitor_entry(&mut self, entry: &MonitorEntry) {
        self.write_key(&entry.key);
        self.write_i32(entry.result);
        self.write_i64(entry.timestamp.secs);
        self.write_i64(entry.timestamp.nanos);
    }

    /// Patch the total length and hand over the finished frame.
    pub fn finish(mut self) -> Vec<u8> {
        let total = self.out.len() as u32;
        LittleEndian::write_u32(&mut self.out[4..8], total);
        self.out
    }
}

/// Reads dialect fields off an extracted frame payload, enforcing the
/// string and vector caps.
pub struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> FrameReader<'a> {
        FrameReader { data, pos: 0 }
    }

    fn take(&mut self, count: usize) -> WireResult<&'a [u8]> {
        if self.data.len() - self.pos < count {
            return Err(WireError::OutOfData);
        }

        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> WireResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> WireResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> WireResult<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_bool(&mut self) -> WireResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_string(&mut self) -> WireResult<String> {
        let length = self.read_u32()?;
        if length > MAX_STRING_LEN {
            return Err(WireError::StringTooLong(length));
        }

        let raw = self.take(length as usize)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::BadValue)
    }

    /// Element count of a vector, capped.
    pub fn read_count(&mut self) -> WireResult<usize> {
        let count = self.read_u32()?;
        if count > MAX_VECTOR_LEN {
            return Err(WireError::VectorTooLong(count));
        }

        Ok(count as usize)
    }

    pub fn read_key(&mut self) -> WireResult<PolicyKey> {
        let client = self.read_string()?;
        let user = self.read_string()?;
        let privilege = self.read_string()?;
        Ok(PolicyKey::new(client, user, privilege))
    }

    pub fn read_result(&mut self) -> WireResult<PolicyResult> {
        let policy_type = PolicyType(self.read_u16()?);
        let metadata = self.read_string()?;
        Ok(PolicyResult::new(policy_type, metadata))
    }

    pub fn read_monitor_entry(&mut self) -> WireResult<MonitorEntry> {
        let key = self.read_key()?;
        let result = self.read_i32()?;
        let secs = self.read_i64()?;
        let nanos = self.read_i64()?;

        Ok(MonitorEntry {
            key,
            result,
            timestamp: Timestamp { secs, nanos },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(writer: FrameWriter) -> Vec<u8> {
        writer.finish()[HEADER_SIZE..].to_vec()
    }

    #[test]
    fn test_scalar_roundtrip() {
        let mut writer = FrameWriter::new(0);
        writer.write_u8(0xAB);
        writer.write_u16(0xCDEF);
        writer.write_u32(0x01020304);
        writer.write_i32(-5);
        writer.write_i64(-6_000_000_000);
        writer.write_bool(true);
        writer.write_bool(false);

        let body = payload(writer);
        let mut reader = FrameReader::new(&body);

        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16().unwrap(), 0xCDEF);
        assert_eq!(reader.read_u32().unwrap(), 0x01020304);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_i64().unwrap(), -6_000_000_000);
        assert_eq!(reader.read_bool().unwrap(), true);
        assert_eq!(reader.read_bool().unwrap(), false);
        assert_eq!(reader.read_u8().unwrap_err(), WireError::OutOfData);
    }

    #[test]
    fn test_key_and_result_roundtrip() {
        let key = PolicyKey::new("client", "user", "privilege");
        let result = PolicyResult::new(PolicyType(42), "meta");

        let mut writer = FrameWriter::new(0);
        writer.write_key(&key);
        writer.write_result(&result);

        let body = payload(writer);
        let mut reader = FrameReader::new(&body);

        assert_eq!(reader.read_key().unwrap(), key);
        assert_eq!(reader.read_result().unwrap(), result);
    }

    #[test]
    fn test_string_at_cap_is_accepted() {
        let big = "x".repeat(MAX_STRING_LEN as usize);

        let mut writer = FrameWriter::new(0);
        writer.write_string(&big);

        let body = payload(writer);
        assert_eq!(FrameReader::new(&body).read_string().unwrap(), big);
    }

    #[test]
    fn test_string_over_cap_is_rejected() {
        let mut writer = FrameWriter::new(0);
        writer.write_u32(MAX_STRING_LEN + 1);

        let body = payload(writer);
        assert_eq!(
            FrameReader::new(&body).read_string().unwrap_err(),
            WireError::StringTooLong(MAX_STRING_LEN + 1)
        );
    }

    #[test]
    fn test_vector_count_cap() {
        let mut writer = FrameWriter::new(0);
        writer.write_count(MAX_VECTOR_LEN as usize);
        let body = payload(writer);
        assert_eq!(
            FrameReader::new(&body).read_count().unwrap(),
            MAX_VECTOR_LEN as usize
        );

        let mut writer = FrameWriter::new(0);
        writer.write_u32(MAX_VECTOR_LEN + 1);
        let body = payload(writer);
        assert_eq!(
            FrameReader::new(&body).read_count().unwrap_err(),
            WireError::VectorTooLong(MAX_VECTOR_LEN + 1)
        );
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut writer = FrameWriter::new(0);
        writer.write_u32(2);
        writer.write_u8(0xFF);
        writer.write_u8(0xFE);

        let body = payload(writer);
        assert_eq!(
            FrameReader::new(&body).read_string().unwrap_err(),
            WireError::BadValue
        );
    }
}
