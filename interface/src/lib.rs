//! # Ghostnet Interface
//! Owns the connections of one process: runs the connect handshake over an
//! unreliable transport, routes datagrams by address, wires in-process
//! connections together and drops peers that stop answering.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

mod connection_key;
mod error;
mod handshake;
mod interface_config;
mod net_interface;
mod packet;

pub mod transport;

pub use connection_key::ConnectionKey;
pub use error::{InterfaceError, TransportError};
pub use interface_config::InterfaceConfig;
pub use net_interface::{ConnectionFactory, InterfaceEvent, NetInterface};
pub use packet::{is_connected_packet, OobHeader, OobPacketType};
