use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Protocol is locked and cannot be modified
    #[error("Protocol is already locked and cannot be modified. Protocol.lock() has been called and no further changes are allowed")]
    AlreadyLocked,

    /// The same Rust type was registered twice
    #[error("Type {name} is already registered with this Protocol")]
    DuplicateKind { name: &'static str },

    /// More kinds were registered than a class id can address
    #[error("Cannot register {name}: the Protocol already holds {count} kinds")]
    TooManyKinds { name: &'static str, count: usize },
}
