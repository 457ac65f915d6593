/// Stable result codes of the public API surface. The numeric values are
/// part of the wire and library contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ApiCode {
    Success = 0,
    AccessDenied = 1,
    AccessAllowed = 2,
    AccessNotResolved = 3,
    Interrupted = 4,
    CacheMiss = -1,
    MaxPendingRequests = -2,
    OutOfMemory = -3,
    InvalidParam = -4,
    ServiceNotAvailable = -5,
    MethodNotSupported = -6,
    OperationNotAllowed = -7,
    OperationFailed = -8,
    BucketNotFound = -9,
    UnknownError = -10,
    ConfigurationError = -11,
    InvalidCommandlineParam = -12,
    BufferTooShort = -13,
    DatabaseCorrupted = -14,
    PermissionDenied = -15,
}

impl ApiCode {
    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<ApiCode> {
        use self::ApiCode::*;

        Some(match raw {
            0 => Success,
            1 => AccessDenied,
            2 => AccessAllowed,
            3 => AccessNotResolved,
            4 => Interrupted,
            -1 => CacheMiss,
            -2 => MaxPendingRequests,
            -3 => OutOfMemory,
            -4 => InvalidParam,
            -5 => ServiceNotAvailable,
            -6 => MethodNotSupported,
            -7 => OperationNotAllowed,
            -8 => OperationFailed,
            -9 => BucketNotFound,
            -10 => UnknownError,
            -11 => ConfigurationError,
            -12 => InvalidCommandlineParam,
            -13 => BufferTooShort,
            -14 => DatabaseCorrupted,
            -15 => PermissionDenied,
            _ => return None,
        })
    }

    /// Fixed human-readable description; translation is the caller's problem.
    pub fn strerror(self) -> &'static str {
        use self::ApiCode::*;

        match self {
            Success => "operation succeeded",
            AccessDenied => "access denied",
            AccessAllowed => "access allowed",
            AccessNotResolved => "access could not be resolved",
            Interrupted => "operation interrupted",
            CacheMiss => "value not present in cache",
            MaxPendingRequests => "pending request limit reached",
            OutOfMemory => "out of memory",
            InvalidParam => "invalid parameter",
            ServiceNotAvailable => "service not available",
            MethodNotSupported => "method not supported",
            OperationNotAllowed => "operation not allowed",
            OperationFailed => "operation failed",
            BucketNotFound => "bucket not found",
            UnknownError => "unknown error",
            ConfigurationError => "configuration error",
            InvalidCommandlineParam => "invalid command-line parameter",
            BufferTooShort => "buffer too short",
            DatabaseCorrupted => "database corrupted",
            PermissionDenied => "permission denied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        for raw in -15..=4 {
            if let Some(code) = ApiCode::from_raw(raw) {
                assert_eq!(code.as_raw(), raw);
            }
        }
        assert_eq!(ApiCode::from_raw(5), None);
        assert_eq!(ApiCode::from_raw(-16), None);
    }

    #[test]
    fn test_strerror_is_total() {
        assert_eq!(ApiCode::CacheMiss.strerror(), "value not present in cache");
        assert_eq!(ApiCode::DatabaseCorrupted.strerror(), "database corrupted");
    }
}
