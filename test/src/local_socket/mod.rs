/// In-memory socket implementation for E2E testing
/// Routes packets between server and client without network I/O
use std::{
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard},
};

use ghostnet_interface::{
    transport::{PacketReceiver, PacketSender},
    TransportError,
};

pub const CLIENT_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 12345);
pub const SERVER_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 54321);

#[derive(Default)]
struct Link {
    queue: VecDeque<Vec<u8>>,
    drop_next: usize,
    blocked: bool,
    sent: usize,
    dropped: usize,
}

/// Handle on one direction of a [`LocalSocketPair`], used by tests to lose
/// packets on purpose
#[derive(Clone, Default)]
pub struct LinkControl {
    link: Arc<Mutex<Link>>,
}

impl LinkControl {
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loses the next `count` packets sent in this direction
    pub fn drop_next(&self, count: usize) {
        self.lock().drop_next += count;
    }

    /// Loses every packet sent in this direction until unblocked
    pub fn set_blocked(&self, blocked: bool) {
        self.lock().blocked = blocked;
    }

    /// Packets handed to the link, lost ones included
    pub fn sent_count(&self) -> usize {
        self.lock().sent
    }

    pub fn dropped_count(&self) -> usize {
        self.lock().dropped
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    fn push(&self, payload: &[u8]) {
        let mut link = self.lock();
        link.sent += 1;
        if link.blocked {
            link.dropped += 1;
            return;
        }
        if link.drop_next > 0 {
            link.drop_next -= 1;
            link.dropped += 1;
            return;
        }
        link.queue.push_back(payload.to_vec());
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.lock().queue.pop_front()
    }
}

/// Pair of connected server and client sockets for E2E testing
pub struct LocalSocketPair {
    pub client_to_server: LinkControl,
    pub server_to_client: LinkControl,
}

impl LocalSocketPair {
    pub fn new() -> Self {
        Self {
            client_to_server: LinkControl::default(),
            server_to_client: LinkControl::default(),
        }
    }

    pub fn server_socket(&self) -> (LocalSender, LocalReceiver) {
        let sender = LocalSender {
            link: self.server_to_client.clone(),
            peer_addr: CLIENT_ADDR,
        };
        let receiver = LocalReceiver {
            link: self.client_to_server.clone(),
            peer_addr: CLIENT_ADDR,
            last_payload: Vec::new(),
        };
        (sender, receiver)
    }

    pub fn client_socket(&self) -> (LocalSender, LocalReceiver) {
        let sender = LocalSender {
            link: self.client_to_server.clone(),
            peer_addr: SERVER_ADDR,
        };
        let receiver = LocalReceiver {
            link: self.server_to_client.clone(),
            peer_addr: SERVER_ADDR,
            last_payload: Vec::new(),
        };
        (sender, receiver)
    }
}

impl Default for LocalSocketPair {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LocalSender {
    link: LinkControl,
    peer_addr: SocketAddr,
}

impl PacketSender for LocalSender {
    fn send(&self, address: &SocketAddr, payload: &[u8]) -> Result<(), TransportError> {
        if address != &self.peer_addr {
            return Err(TransportError::SendFailed {
                address: *address,
                size: payload.len(),
            });
        }
        self.link.push(payload);
        Ok(())
    }
}

pub struct LocalReceiver {
    link: LinkControl,
    peer_addr: SocketAddr,
    last_payload: Vec<u8>,
}

impl PacketReceiver for LocalReceiver {
    fn receive(&mut self) -> Result<Option<(SocketAddr, &[u8])>, TransportError> {
        match self.link.pop() {
            Some(packet) => {
                self.last_payload = packet;
                Ok(Some((self.peer_addr, &self.last_payload)))
            }
            None => Ok(None),
        }
    }
}
