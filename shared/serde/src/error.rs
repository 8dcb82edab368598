use thiserror::Error;

/// Returned when a read runs past the end of the buffer, or the data read
/// cannot be turned back into the requested type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Bit stream could not be deserialized: buffer underflow or malformed data")]
pub struct SerdeErr;
