use std::net::SocketAddr;

use thiserror::Error;

use ghostnet_shared::ConnectionError;

use crate::connection_key::ConnectionKey;

/// Errors that can occur when moving datagrams through a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The datagram could not be handed to the transport
    #[error("Failed to send {size} byte packet to {address}")]
    SendFailed { address: SocketAddr, size: usize },

    /// The transport failed while polling for datagrams
    #[error("Failed to receive packets: {message}")]
    ReceiveFailed { message: String },

    /// The socket could not be opened
    #[error("Failed to bind socket at {address}: {message}")]
    BindFailed { address: SocketAddr, message: String },
}

/// Errors that can occur when driving a NetInterface
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceError {
    /// No connection is registered under this key
    #[error("No connection with key {key:?}")]
    UnknownConnection { key: ConnectionKey },

    /// Network operation on an interface without a transport
    #[error("NetInterface has no transport; call listen() first")]
    NoTransport,

    /// A connection or connection attempt already uses this address
    #[error("A connection to {address} already exists")]
    AddressInUse { address: SocketAddr },

    /// The system random source could not seed the challenge key
    #[error("Failed to generate the challenge digest key")]
    KeyGenerationFailed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
