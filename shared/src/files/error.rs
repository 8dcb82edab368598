use thiserror::Error;

/// Errors that can occur while transferring files to a client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileTransferError {
    /// A chunk arrived that does not fit the announced file
    #[error("Invalid file chunk from server.")]
    InvalidChunk,

    /// A completed download could not be stored
    #[error("Couldn't open file downloaded by server.")]
    SaveFailed { name: String },

    /// An object needs files that could not be obtained
    #[error("Missing files required by a ghost-always object: {names:?}")]
    MissingFiles { names: Vec<String> },
}
