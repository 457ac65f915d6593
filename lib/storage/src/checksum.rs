use crate::error::{StorageError, StorageResult};
use hashbrown::HashMap;
use sha2::{Digest, Sha256};
use warden_core::paths::{CHECKSUM_FILENAME, FIELD_SEPARATOR, RECORD_SEPARATOR};

/// Digest book for the database file set: `filename;digest` records, one
/// per line, keyed by the primary (backup-suffix-free) filename.
pub struct ChecksumValidator {
    sums: HashMap<String, String>,
}

impl ChecksumValidator {
    pub fn new() -> ChecksumValidator {
        ChecksumValidator {
            sums: HashMap::new(),
        }
    }

    pub fn generate(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    pub fn load(content: &str) -> StorageResult<ChecksumValidator> {
        let mut sums = HashMap::new();

        for (num, line) in content.split(RECORD_SEPARATOR).enumerate() {
            if line.is_empty() {
                break;
            }

            let mut fields = line.splitn(2, FIELD_SEPARATOR);
            let filename = fields.next().unwrap_or("");
            let digest = fields.next().unwrap_or("");

            if filename.is_empty() || digest.is_empty() {
                return Err(StorageError::RecordCorrupted {
                    filename: CHECKSUM_FILENAME.to_string(),
                    line: num + 1,
                });
            }

            sums.insert(filename.to_string(), digest.to_string());
        }

        Ok(ChecksumValidator { sums })
    }

    pub fn record(&mut self, filename: &str, data: &[u8]) {
        self.sums
            .insert(filename.to_string(), Self::generate(data));
    }

    pub fn compare(&self, filename: &str, data: &[u8]) -> StorageResult<()> {
        match self.sums.get(filename) {
            Some(digest) if *digest == Self::generate(data) => Ok(()),
            _ => Err(StorageError::ChecksumMismatch(filename.to_string())),
        }
    }

    /// Render the records, sorted by filename so the file content is
    /// reproducible.
    pub fn dump(&self) -> String {
        let mut names: Vec<_> = self.sums.keys().collect();
        names.sort();

        let mut out = String::new();
        for name in names {
            out.push_str(name);
            out.push(FIELD_SEPARATOR);
            out.push_str(&self.sums[name]);
            out.push(RECORD_SEPARATOR);
        }
        out
    }
}

impl Default for ChecksumValidator {
    fn default() -> ChecksumValidator {
        ChecksumValidator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_compare_roundtrip() {
        let mut validator = ChecksumValidator::new();
        validator.record("buckets", b"contents");

        assert!(validator.compare("buckets", b"contents").is_ok());
        assert!(matches!(
            validator.compare("buckets", b"tampered"),
            Err(StorageError::ChecksumMismatch(_))
        ));
        assert!(matches!(
            validator.compare("unknown", b"contents"),
            Err(StorageError::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn test_dump_load_roundtrip() {
        let mut validator = ChecksumValidator::new();
        validator.record("buckets", b"index");
        validator.record("_", b"root");
        validator.record("_extra", b"extra");

        let reloaded = ChecksumValidator::load(&validator.dump()).unwrap();

        assert!(reloaded.compare("buckets", b"index").is_ok());
        assert!(reloaded.compare("_", b"root").is_ok());
        assert!(reloaded.compare("_extra", b"extra").is_ok());
    }

    #[test]
    fn test_load_rejects_malformed_record() {
        let result = ChecksumValidator::load("buckets\n");

        assert!(matches!(
            result,
            Err(StorageError::RecordCorrupted { line: 1, .. })
        ));
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = ChecksumValidator::generate(b"");

        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
