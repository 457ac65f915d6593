use crate::buffer::BinaryQueue;
use crate::encoding::{FrameReader, FrameWriter};
use crate::frame::extract_frame;
use crate::messages::{AgentAction, AgentOp, AgentReply, AgentRequest, AgentResponse, WireCode};
use crate::support::{WireError, WireResult};

pub const OP_REGISTER_REQUEST: u8 = 0x40;
pub const OP_ACTION_REQUEST: u8 = 0x41;

pub const OP_REGISTER_RESPONSE: u8 = 0x50;
pub const OP_ACTION_RESPONSE: u8 = 0x51;

/// Requests travel agent → service: registration and action replies. The
/// sequence number of an action request is the check id assigned by the
/// service when the action was pushed out.
pub fn extract_request(queue: &mut BinaryQueue) -> WireResult<Option<AgentRequest>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let op = match opcode {
        OP_REGISTER_REQUEST => AgentOp::Register {
            agent_type: reader.read_string()?,
        },
        OP_ACTION_REQUEST => {
            let raw = reader.read_u8()?;
            AgentOp::Action {
                action: AgentAction::from_raw(raw).ok_or(WireError::BadValue)?,
                data: reader.read_string()?,
            }
        }
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(AgentRequest { seq, op }))
}

pub fn encode_request(request: &AgentRequest) -> Vec<u8> {
    let mut writer = FrameWriter::new(request.seq);

    match &request.op {
        AgentOp::Register { agent_type } => {
            writer.write_u8(OP_REGISTER_REQUEST);
            writer.write_string(agent_type);
        }
        AgentOp::Action { action, data } => {
            writer.write_u8(OP_ACTION_REQUEST);
            writer.write_u8(*action as u8);
            writer.write_string(data);
        }
    }

    writer.finish()
}

/// Responses travel service → agent: the registration outcome and pushed
/// actions (either a fresh delegated check or its cancellation).
pub fn extract_response(queue: &mut BinaryQueue) -> WireResult<Option<AgentResponse>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let reply = match opcode {
        OP_REGISTER_RESPONSE => {
            let raw = reader.read_u16()?;
            AgentReply::Register(WireCode::from_raw(raw).ok_or(WireError::BadValue)?)
        }
        OP_ACTION_RESPONSE => {
            let raw = reader.read_u8()?;
            AgentReply::Action {
                action: AgentAction::from_raw(raw).ok_or(WireError::BadValue)?,
                data: reader.read_string()?,
            }
        }
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(AgentResponse { seq, reply }))
}

pub fn encode_response(response: &AgentResponse) -> Vec<u8> {
    let mut writer = FrameWriter::new(response.seq);

    match &response.reply {
        AgentReply::Register(code) => {
            writer.write_u8(OP_REGISTER_RESPONSE);
            writer.write_u16(*code as u16);
        }
        AgentReply::Action { action, data } => {
            writer.write_u8(OP_ACTION_RESPONSE);
            writer.write_u8(*action as u8);
            writer.write_string(data);
        }
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_roundtrip() {
        let request = AgentRequest {
            seq: 0,
            op: AgentOp::Register {
                agent_type: "a.test".into(),
            },
        };

        let mut queue = BinaryQueue::new();
        queue.append(&encode_request(&request));
        assert_eq!(extract_request(&mut queue).unwrap().unwrap(), request);

        let response = AgentResponse {
            seq: 0,
            reply: AgentReply::Register(WireCode::Rejected),
        };

        queue.append(&encode_response(&response));
        assert_eq!(extract_response(&mut queue).unwrap().unwrap(), response);
    }

    #[test]
    fn test_action_roundtrip() {
        let request = AgentRequest {
            seq: 17,
            op: AgentOp::Action {
                action: AgentAction::Action,
                data: "reply-data".into(),
            },
        };

        let mut queue = BinaryQueue::new();
        queue.append(&encode_request(&request));
        assert_eq!(extract_request(&mut queue).unwrap().unwrap(), request);
    }

    #[test]
    fn test_cancel_push_roundtrip() {
        let response = AgentResponse {
            seq: 17,
            reply: AgentReply::Action {
                action: AgentAction::Cancel,
                data: String::new(),
            },
        };

        let mut queue = BinaryQueue::new();
        queue.append(&encode_response(&response));
        assert_eq!(extract_response(&mut queue).unwrap().unwrap(), response);
    }

    #[test]
    fn test_unknown_action_value() {
        let mut writer = FrameWriter::new(1);
        writer.write_u8(OP_ACTION_REQUEST);
        writer.write_u8(9);
        writer.write_string("");

        let mut queue = BinaryQueue::new();
        queue.append(&writer.finish());

        assert_eq!(extract_request(&mut queue).unwrap_err(), WireError::BadValue);
    }
}
