use std::io;

/// Protocol violations. Any of these is fatal to the connection that
/// produced the bytes; partial input is not an error and is represented as
/// `Ok(None)` by the extractors.
#[derive(Debug, PartialEq, Eq)]
pub enum WireError {
    InvalidSignature,
    WrongOpCode(u8),
    FrameTooLarge(u32),
    FrameTooShort(u32),
    StringTooLong(u32),
    VectorTooLong(u32),
    BadValue,
    OutOfData,
    Io(io::ErrorKind),
}

pub type WireResult<T> = Result<T, WireError>;

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> WireError {
        WireError::Io(err.kind())
    }
}
