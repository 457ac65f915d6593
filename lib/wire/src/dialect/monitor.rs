use crate::buffer::BinaryQueue;
use crate::encoding::{FrameReader, FrameWriter};
use crate::frame::extract_frame;
use crate::messages::{MonitorOp, MonitorReply, MonitorRequest, MonitorResponse};
use crate::support::{WireError, WireResult};

pub const OP_GET_ENTRIES_REQUEST: u8 = 0x60;
pub const OP_FLUSH_REQUEST: u8 = 0x61;

pub const OP_ENTRIES_RESPONSE: u8 = 0x70;

pub fn extract_request(queue: &mut BinaryQueue) -> WireResult<Option<MonitorRequest>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let op = match opcode {
        OP_GET_ENTRIES_REQUEST => MonitorOp::GetEntries {
            capacity: reader.read_u16()?,
        },
        OP_FLUSH_REQUEST => MonitorOp::Flush,
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(MonitorRequest { seq, op }))
}

pub fn encode_request(request: &MonitorRequest) -> Vec<u8> {
    let mut writer = FrameWriter::new(request.seq);

    match &request.op {
        MonitorOp::GetEntries { capacity } => {
            writer.write_u8(OP_GET_ENTRIES_REQUEST);
            writer.write_u16(*capacity);
        }
        MonitorOp::Flush => writer.write_u8(OP_FLUSH_REQUEST),
    }

    writer.finish()
}

pub fn extract_response(queue: &mut BinaryQueue) -> WireResult<Option<MonitorResponse>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let reply = match opcode {
        OP_ENTRIES_RESPONSE => {
            let count = reader.read_count()?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(reader.read_monitor_entry()?);
            }
            MonitorReply::Entries(entries)
        }
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(MonitorResponse { seq, reply }))
}

pub fn encode_response(response: &MonitorResponse) -> Vec<u8> {
    let mut writer = FrameWriter::new(response.seq);

    match &response.reply {
        MonitorReply::Entries(entries) => {
            writer.write_u8(OP_ENTRIES_RESPONSE);
            writer.write_count(entries.len());
            for entry in entries {
                writer.write_monitor_entry(entry);
            }
        }
    }

    writer.finish()
}
