use thiserror::Error;

use crate::{events::error::EventError, ghosts::error::GhostError};

/// Errors that can occur while recording or replaying a demo
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemoError {
    #[error("A demo is already being recorded")]
    AlreadyRecording,

    #[error("No demo is being played back")]
    NotPlaying,

    /// Reading or writing the demo stream failed
    #[error("Demo stream I/O failed: {message}")]
    Io { message: String },

    /// The demo was recorded with a different protocol
    #[error("Demo protocol version {found} does not match {expected}")]
    ProtocolVersionMismatch { expected: u32, found: u32 },

    /// The start block could not be decoded
    #[error("Demo start block is malformed")]
    InvalidStartBlock,

    #[error("Demo block type {block_type} is not known")]
    UnknownBlockType { block_type: u16 },

    #[error("Demo block of {size} bytes exceeds the {max} byte limit")]
    BlockTooLarge { size: usize, max: usize },
}

impl From<std::io::Error> for DemoError {
    fn from(error: std::io::Error) -> Self {
        DemoError::Io {
            message: error.to_string(),
        }
    }
}

/// General connection-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Setting that may only change before the handshake completes
    #[error("Cannot change {setting} after the connection is established")]
    AlreadyEstablished { setting: &'static str },

    /// Handshake refused, with the reason given by the refusing side
    #[error("Connection rejected: {reason}")]
    Rejected { reason: String },

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Ghost error: {0}")]
    Ghost(#[from] GhostError),

    #[error("Demo error: {0}")]
    Demo(#[from] DemoError),
}
