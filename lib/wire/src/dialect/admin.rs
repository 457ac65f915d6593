use crate::buffer::BinaryQueue;
use crate::encoding::{FrameReader, FrameWriter};
use crate::frame::extract_frame;
use crate::messages::{AdminOp, AdminReply, AdminRequest, AdminResponse, WireCode};
use crate::support::{WireError, WireResult};
use warden_core::{BucketId, Policy, PolicyKey};

pub const OP_CHECK_REQUEST: u8 = 0x20;
pub const OP_SET_BUCKET_REQUEST: u8 = 0x21;
pub const OP_REMOVE_BUCKET_REQUEST: u8 = 0x22;
pub const OP_SET_POLICIES_REQUEST: u8 = 0x23;
pub const OP_LIST_REQUEST: u8 = 0x24;
pub const OP_ERASE_REQUEST: u8 = 0x25;
pub const OP_LIST_DESCRIPTIONS_REQUEST: u8 = 0x26;

pub const OP_CHECK_RESPONSE: u8 = 0x30;
pub const OP_LIST_RESPONSE: u8 = 0x31;
pub const OP_CODE_RESPONSE: u8 = 0x32;
pub const OP_DESCRIPTION_LIST_RESPONSE: u8 = 0x33;

fn read_policy_groups(reader: &mut FrameReader) -> WireResult<Vec<(BucketId, Vec<Policy>)>> {
    let group_count = reader.read_count()?;
    let mut groups = Vec::with_capacity(group_count);

    for _ in 0..group_count {
        let bucket = BucketId::from(reader.read_string()?);
        let policy_count = reader.read_count()?;
        let mut policies = Vec::with_capacity(policy_count);

        for _ in 0..policy_count {
            let key = reader.read_key()?;
            let result = reader.read_result()?;
            policies.push(Policy::new(key, result));
        }

        groups.push((bucket, policies));
    }

    Ok(groups)
}

fn read_key_groups(reader: &mut FrameReader) -> WireResult<Vec<(BucketId, Vec<PolicyKey>)>> {
    let group_count = reader.read_count()?;
    let mut groups = Vec::with_capacity(group_count);

    for _ in 0..group_count {
        let bucket = BucketId::from(reader.read_string()?);
        let key_count = reader.read_count()?;
        let mut keys = Vec::with_capacity(key_count);

        for _ in 0..key_count {
            keys.push(reader.read_key()?);
        }

        groups.push((bucket, keys));
    }

    Ok(groups)
}

pub fn extract_request(queue: &mut BinaryQueue) -> WireResult<Option<AdminRequest>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let op = match opcode {
        OP_CHECK_REQUEST => AdminOp::Check {
            key: reader.read_key()?,
            start_bucket: BucketId::from(reader.read_string()?),
            recursive: reader.read_bool()?,
        },
        OP_SET_BUCKET_REQUEST => AdminOp::SetBucket {
            bucket: BucketId::from(reader.read_string()?),
            default: reader.read_result()?,
        },
        OP_REMOVE_BUCKET_REQUEST => AdminOp::RemoveBucket {
            bucket: BucketId::from(reader.read_string()?),
        },
        OP_SET_POLICIES_REQUEST => AdminOp::SetPolicies {
            insert_or_update: read_policy_groups(&mut reader)?,
            remove: read_key_groups(&mut reader)?,
        },
        OP_LIST_REQUEST => AdminOp::List {
            bucket: BucketId::from(reader.read_string()?),
            filter: reader.read_key()?,
        },
        OP_ERASE_REQUEST => AdminOp::Erase {
            start_bucket: BucketId::from(reader.read_string()?),
            recursive: reader.read_bool()?,
            filter: reader.read_key()?,
        },
        OP_LIST_DESCRIPTIONS_REQUEST => AdminOp::ListDescriptions,
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(AdminRequest { seq, op }))
}

pub fn encode_request(request: &AdminRequest) -> Vec<u8> {
    let mut writer = FrameWriter::new(request.seq);

    match &request.op {
        AdminOp::Check {
            key,
            start_bucket,
            recursive,
        } => {
            writer.write_u8(OP_CHECK_REQUEST);
            writer.write_key(key);
            writer.write_string(start_bucket);
            writer.write_bool(*recursive);
        }
        AdminOp::SetBucket { bucket, default } => {
            writer.write_u8(OP_SET_BUCKET_REQUEST);
            writer.write_string(bucket);
            writer.write_result(default);
        }
        AdminOp::RemoveBucket { bucket } => {
            writer.write_u8(OP_REMOVE_BUCKET_REQUEST);
            writer.write_string(bucket);
        }
        AdminOp::SetPolicies {
            insert_or_update,
            remove,
        } => {
            writer.write_u8(OP_SET_POLICIES_REQUEST);

            writer.write_count(insert_or_update.len());
            for (bucket, policies) in insert_or_update {
                writer.write_string(bucket);
                writer.write_count(policies.len());
                for policy in policies {
                    writer.write_key(&policy.key);
                    writer.write_result(&policy.result);
                }
            }

            writer.write_count(remove.len());
            for (bucket, keys) in remove {
                writer.write_string(bucket);
                writer.write_count(keys.len());
                for key in keys {
                    writer.write_key(key);
                }
            }
        }
        AdminOp::List { bucket, filter } => {
            writer.write_u8(OP_LIST_REQUEST);
            writer.write_string(bucket);
            writer.write_key(filter);
        }
        AdminOp::Erase {
            start_bucket,
            recursive,
            filter,
        } => {
            writer.write_u8(OP_ERASE_REQUEST);
            writer.write_string(start_bucket);
            writer.write_bool(*recursive);
            writer.write_key(filter);
        }
        AdminOp::ListDescriptions => writer.write_u8(OP_LIST_DESCRIPTIONS_REQUEST),
    }

    writer.finish()
}

pub fn extract_response(queue: &mut BinaryQueue) -> WireResult<Option<AdminResponse>> {
    let (seq, payload) = match extract_frame(queue)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    let mut reader = FrameReader::new(&payload);
    let opcode = reader.read_u8()?;

    let reply = match opcode {
        OP_CHECK_RESPONSE => AdminReply::Check(reader.read_result()?),
        OP_LIST_RESPONSE => {
            let policy_count = reader.read_count()?;
            let mut policies = Vec::with_capacity(policy_count);
            for _ in 0..policy_count {
                let key = reader.read_key()?;
                let result = reader.read_result()?;
                policies.push(Policy::new(key, result));
            }
            AdminReply::List {
                policies,
                bucket_valid: reader.read_bool()?,
            }
        }
        OP_CODE_RESPONSE => {
            let raw = reader.read_u16()?;
            AdminReply::Code(WireCode::from_raw(raw).ok_or(WireError::BadValue)?)
        }
        OP_DESCRIPTION_LIST_RESPONSE => {
            let count = reader.read_count()?;
            let mut descriptions = Vec::with_capacity(count);
            for _ in 0..count {
                let policy_type = reader.read_u16()?;
                let name = reader.read_string()?;
                descriptions.push((policy_type, name));
            }
            AdminReply::Descriptions(descriptions)
        }
        other => return Err(WireError::WrongOpCode(other)),
    };

    Ok(Some(AdminResponse { seq, reply }))
}

pub fn encode_response(response: &AdminResponse) -> Vec<u8> {
    let mut writer = FrameWriter::new(response.seq);

    match &response.reply {
        AdminReply::Check(result) => {
            writer.write_u8(OP_CHECK_RESPONSE);
            writer.write_result(result);
        }
        AdminReply::List {
            policies,
            bucket_valid,
        } => {
            writer.write_u8(OP_LIST_RESPONSE);
            writer.write_count(policies.len());
            for policy in policies {
                writer.write_key(&policy.key);
                writer.write_result(&policy.result);
            }
            writer.write_bool(*bucket_valid);
        }
        AdminReply::Code(code) => {
            writer.write_u8(OP_CODE_RESPONSE);
            writer.write_u16(*code as u16);
        }
        AdminReply::Descriptions(descriptions) => {
            writer.write_u8(OP_DESCRIPTION_LIST_RESPONSE);
            writer.write_count(descriptions.len());
            for (policy_type, name) in descriptions {
                writer.write_u16(*policy_type);
                writer.write_string(name);
            }
        }
    }

    writer.finish()
}
