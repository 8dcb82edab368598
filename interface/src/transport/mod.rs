use std::net::SocketAddr;

use crate::error::TransportError;

cfg_if! {
    if #[cfg(feature = "transport_udp")] {
        mod udp;
        pub use udp::UdpSocket;
    } else {}
}

/// Used to send datagrams to remote addresses
pub trait PacketSender {
    /// Sends a datagram to the given address
    fn send(&self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError>;
}

/// Used to receive datagrams from remote addresses
pub trait PacketReceiver {
    /// Receives the next waiting datagram, or None if nothing is waiting
    fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, TransportError>;
}
