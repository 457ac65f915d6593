//! Text form of the database: LF-separated records with `;`-separated
//! fields. Index records are `id;0xTYPE;metadata`, policy records are
//! `client;user;privilege;0xTYPE;metadata`. Metadata is always the last
//! field and may itself contain separators.

use crate::bucket::PolicyBucket;
use crate::error::{StorageError, StorageResult};
use warden_core::paths::{FIELD_SEPARATOR, RECORD_SEPARATOR};
use warden_core::{BucketId, Policy, PolicyKey, PolicyResult, PolicyType};

pub fn dump_index<'a, I: Iterator<Item = &'a PolicyBucket>>(buckets: I) -> String {
    let mut out = String::new();

    for bucket in buckets {
        out.push_str(bucket.id());
        out.push(FIELD_SEPARATOR);
        dump_result(&mut out, bucket.default());
        out.push(RECORD_SEPARATOR);
    }

    out
}

pub fn dump_bucket(bucket: &PolicyBucket) -> String {
    let mut out = String::new();

    for policy in bucket.iter() {
        out.push_str(&policy.key.client);
        out.push(FIELD_SEPARATOR);
        out.push_str(&policy.key.user);
        out.push(FIELD_SEPARATOR);
        out.push_str(&policy.key.privilege);
        out.push(FIELD_SEPARATOR);
        dump_result(&mut out, &policy.result);
        out.push(RECORD_SEPARATOR);
    }

    out
}

fn dump_result(out: &mut String, result: &PolicyResult) {
    out.push_str(&format!("0x{:X}", result.policy_type().0));
    out.push(FIELD_SEPARATOR);
    out.push_str(result.metadata());
}

pub fn parse_index(content: &str, filename: &str) -> StorageResult<Vec<(BucketId, PolicyResult)>> {
    let mut entries = Vec::new();

    for (num, line) in content.split(RECORD_SEPARATOR).enumerate() {
        if line.is_empty() {
            break;
        }

        let corrupted = || StorageError::RecordCorrupted {
            filename: filename.to_string(),
            line: num + 1,
        };

        let separator = line.find(FIELD_SEPARATOR).ok_or_else(corrupted)?;
        let id = BucketId::from(&line[..separator]);
        let default = parse_result(&line[separator + 1..]).ok_or_else(corrupted)?;

        entries.push((id, default));
    }

    Ok(entries)
}

pub fn parse_bucket(content: &str, filename: &str) -> StorageResult<Vec<Policy>> {
    let mut policies = Vec::new();

    for (num, line) in content.split(RECORD_SEPARATOR).enumerate() {
        if line.is_empty() {
            break;
        }

        let corrupted = || StorageError::RecordCorrupted {
            filename: filename.to_string(),
            line: num + 1,
        };

        let mut rest = line;
        let mut features = Vec::with_capacity(3);
        for _ in 0..3 {
            let separator = rest.find(FIELD_SEPARATOR).ok_or_else(corrupted)?;
            features.push(&rest[..separator]);
            rest = &rest[separator + 1..];
        }

        let key = PolicyKey::new(features[0], features[1], features[2]);
        let result = parse_result(rest).ok_or_else(corrupted)?;

        policies.push(Policy::new(key, result));
    }

    Ok(policies)
}

/// Parse `0xTYPE` followed by an optional `;metadata` tail.
fn parse_result(text: &str) -> Option<PolicyResult> {
    let (type_text, metadata) = match text.find(FIELD_SEPARATOR) {
        Some(separator) => (&text[..separator], &text[separator + 1..]),
        None => (text, ""),
    };

    let digits = type_text
        .strip_prefix("0x")
        .or_else(|| type_text.strip_prefix("0X"))
        .unwrap_or(type_text);
    let raw = u16::from_str_radix(digits, 16).ok()?;

    Some(PolicyResult::new(PolicyType(raw), metadata))
}
