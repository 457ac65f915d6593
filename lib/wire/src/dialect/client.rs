use crate::buffer::BinaryQueue;
use crate::encoding::{FrameReader, FrameWriter};
use crate::frame::extract_frame;
use crate::messages::{ClientOp, ClientReply, ClientRequest, ClientResponse};
use crate::support::{WireError, WireResult};

pub const OP_CHECK_REQUEST: u8 = 0x00;
pub const OP_CANCEL_REQUEST: u8 = 0x01;
pub const OP_SIMPLE_CHECK_REQUEST: u8 = 0x02;
pub const OP_MONITOR_ENTRIES_PUT: u8 = 0x03;

pub const OP_CHECK_RESPONSE: u8 = 0x10;
pub const OP_CANCEL_RESPONSE: u8 = 0x11;
pub const OP_SIMPLE_CHECK_RESPONSE: u8 = 0x12;

pub fn extract_request(queue: &mut BinaryQueue) -> WireResult<Option<ClientRequest>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let op = match opcode {
        OP_CHECK_REQUEST => ClientOp::Check(reader.read_key()?),
        OP_CANCEL_REQUEST => ClientOp::Cancel,
        OP_SIMPLE_CHECK_REQUEST => ClientOp::SimpleCheck(reader.read_key()?),
        OP_MONITOR_ENTRIES_PUT => {
            let count = reader.read_count()?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(reader.read_monitor_entry()?);
            }
            ClientOp::MonitorEntriesPut(entries)
        }
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(ClientRequest { seq, op }))
}

pub fn encode_request(request: &ClientRequest) -> Vec<u8> {
    let mut writer = FrameWriter::new(request.seq);

    match &request.op {
        ClientOp::Check(key) => {
            writer.write_u8(OP_CHECK_REQUEST);
            writer.write_key(key);
        }
        ClientOp::Cancel => writer.write_u8(OP_CANCEL_REQUEST),
        ClientOp::SimpleCheck(key) => {
            writer.write_u8(OP_SIMPLE_CHECK_REQUEST);
            writer.write_key(key);
        }
        ClientOp::MonitorEntriesPut(entries) => {
            writer.write_u8(OP_MONITOR_ENTRIES_PUT);
            writer.write_count(entries.len());
            for entry in entries {
                writer.write_monitor_entry(entry);
            }
        }
    }

    writer.finish()
}

pub fn extract_response(queue: &mut BinaryQueue) -> WireResult<Option<ClientResponse>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let reply = match opcode {
        OP_CHECK_RESPONSE => ClientReply::Check(reader.read_result()?),
        OP_CANCEL_RESPONSE => ClientReply::Cancel,
        OP_SIMPLE_CHECK_RESPONSE => ClientReply::SimpleCheck {
            code: reader.read_i32()?,
            result: reader.read_result()?,
        },
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(ClientResponse { seq, reply }))
}

pub fn encode_response(response: &ClientResponse) -> Vec<u8> {
    let mut writer = FrameWriter::new(response.seq);

    match &response.reply {
        ClientReply::Check(result) => {
            writer.write_u8(OP_CHECK_RESPONSE);
            writer.write_result(result);
        }
        ClientReply::Cancel => writer.write_u8(OP_CANCEL_RESPONSE),
        ClientReply::SimpleCheck { code, result } => {
            writer.write_u8(OP_SIMPLE_CHECK_RESPONSE);
            writer.write_i32(*code);
            writer.write_result(result);
        }
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::types::Timestamp;
    use warden_core::{MonitorEntry, PolicyKey, PolicyResult, PolicyType};

    fn roundtrip_request(request: ClientRequest) {
        let mut queue = BinaryQueue::new();
        queue.append(&encode_request(&request));

        let extracted = extract_request(&mut queue).unwrap().unwrap();
        assert_eq!(extracted, request);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_check_roundtrip() {
        roundtrip_request(ClientRequest {
            seq: 42,
            op: ClientOp::Check(PolicyKey::new("client", "user", "privilege")),
        });
    }

    #[test]
    fn test_cancel_roundtrip() {
        roundtrip_request(ClientRequest {
            seq: 65535,
            op: ClientOp::Cancel,
        });
    }

    #[test]
    fn test_simple_check_roundtrip() {
        roundtrip_request(ClientRequest {
            seq: 3,
            op: ClientOp::SimpleCheck(PolicyKey::new("", "", "")),
        });
    }

    #[test]
    fn test_monitor_entries_put_roundtrip() {
        let entry = MonitorEntry {
            key: PolicyKey::new("c", "u", "p"),
            result: 1,
            timestamp: Timestamp {
                secs: 1_500_000_000,
                nanos: 42,
            },
        };

        roundtrip_request(ClientRequest {
            seq: 9,
            op: ClientOp::MonitorEntriesPut(vec![entry.clone(), entry]),
        });
    }

    #[test]
    fn test_response_roundtrip() {
        let response = ClientResponse {
            seq: 42,
            reply: ClientReply::Check(PolicyResult::new(PolicyType::ALLOW, "")),
        };

        let mut queue = BinaryQueue::new();
        queue.append(&encode_response(&response));

        assert_eq!(extract_response(&mut queue).unwrap().unwrap(), response);
    }

    #[test]
    fn test_unknown_opcode() {
        let mut writer = FrameWriter::new(0);
        writer.write_u8(0x7F);

        let mut queue = BinaryQueue::new();
        queue.append(&writer.finish());

        assert_eq!(
            extract_request(&mut queue).unwrap_err(),
            WireError::WrongOpCode(0x7F)
        );
    }

    #[test]
    fn test_response_opcode_rejected_on_request_path() {
        let response = ClientResponse {
            seq: 1,
            reply: ClientReply::Cancel,
        };

        let mut queue = BinaryQueue::new();
        queue.append(&encode_response(&response));

        assert_eq!(
            extract_request(&mut queue).unwrap_err(),
            WireError::WrongOpCode(OP_CANCEL_RESPONSE)
        );
    }
}
