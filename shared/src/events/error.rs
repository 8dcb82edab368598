use thiserror::Error;

/// Errors that can occur when posting events to a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Event sending was turned off for this connection
    #[error("Event sending is disabled on this connection")]
    SendingDisabled,

    /// The event's direction does not allow sending it from this side
    #[error("Event cannot be sent from this side of the connection (direction mismatch)")]
    WrongDirection,

    /// The event type was never added to the Protocol
    #[error("Event type is not registered with the Protocol")]
    UnregisteredEvent,
}
