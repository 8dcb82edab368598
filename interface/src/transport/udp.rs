use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket as StdUdpSocket},
    sync::Arc,
};

use ghostnet_shared::MAX_PACKET_DATA_SIZE;

use super::{PacketReceiver, PacketSender};
use crate::error::TransportError;

const RECEIVE_BUFFER_SIZE: usize = MAX_PACKET_DATA_SIZE;

/// A non-blocking UDP socket, split into a sender and a receiver half
pub struct UdpSocket;

impl UdpSocket {
    pub fn bind(address: SocketAddr) -> Result<(UdpSender, UdpReceiver), TransportError> {
        let bind_failed = |error: std::io::Error| TransportError::BindFailed {
            address,
            message: error.to_string(),
        };
        let socket = StdUdpSocket::bind(address).map_err(bind_failed)?;
        socket.set_nonblocking(true).map_err(bind_failed)?;
        let socket = Arc::new(socket);

        let sender = UdpSender {
            socket: socket.clone(),
        };
        let receiver = UdpReceiver {
            socket,
            buffer: vec![0u8; RECEIVE_BUFFER_SIZE],
        };
        Ok((sender, receiver))
    }
}

pub struct UdpSender {
    socket: Arc<StdUdpSocket>,
}

impl UdpSender {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

impl PacketSender for UdpSender {
    fn send(&self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError> {
        match self.socket.send_to(payload, address) {
            Ok(_) => Ok(()),
            // a full send buffer drops the datagram, like the network would
            Err(error) if error.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(_) => Err(TransportError::SendFailed {
                address: *address,
                size: payload.len(),
            }),
        }
    }
}

pub struct UdpReceiver {
    socket: Arc<StdUdpSocket>,
    buffer: Vec<u8>,
}

impl PacketReceiver for UdpReceiver {
    fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, TransportError> {
        loop {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((length, address)) => return Ok(Some((address, &self.buffer[..length]))),
                Err(error) if error.kind() == ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from an earlier send, not a socket failure
                Err(error) if error.kind() == ErrorKind::ConnectionReset => continue,
                Err(error) => {
                    return Err(TransportError::ReceiveFailed {
                        message: error.to_string(),
                    })
                }
            }
        }
    }
}
