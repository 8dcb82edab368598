use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
};

use log::{debug, info, trace, warn};

use ghostnet_shared::{
    BitReader, BitWriter, GameInstant, NetConnection, ObjectRegistry, Serde,
};

use crate::{
    connection_key::{ConnectionKey, KeyGenerator},
    error::InterfaceError,
    handshake::{ChallengeDigest, HandshakeState, PendingConnection},
    interface_config::InterfaceConfig,
    packet::{is_connected_packet, OobHeader, OobPacketType},
    transport::{PacketReceiver, PacketSender},
};

const NOT_ACCEPTING_REASON: &str = "Server is not accepting connections.";
const REFUSED_REASON: &str = "Server refused the connection.";

/// Builds the connection for a peer that asked to connect. Returning `None`
/// refuses the peer.
pub trait ConnectionFactory {
    fn create(&mut self, address: &SocketAddr) -> Option<NetConnection>;
}

impl<F: FnMut(&SocketAddr) -> Option<NetConnection>> ConnectionFactory for F {
    fn create(&mut self, address: &SocketAddr) -> Option<NetConnection> {
        self(address)
    }
}

/// Changes in the set of connections, collected with
/// [`NetInterface::take_events`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceEvent {
    Connected { key: ConnectionKey },
    Rejected { key: ConnectionKey, reason: String },
    ConnectTimedOut { key: ConnectionKey },
    TimedOut { key: ConnectionKey },
    Disconnected { key: ConnectionKey, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Network(SocketAddr),
    /// The other end lives in this interface under the given key
    Local(ConnectionKey),
}

struct ConnectionRecord {
    route: Route,
    connect_sequence: u32,
    connection: NetConnection,
}

/// The connection registry of one process
pub struct NetInterface {
    config: InterfaceConfig,
    key_generator: KeyGenerator,
    sender: Option<Box<dyn PacketSender>>,
    receiver: Option<Box<dyn PacketReceiver>>,
    factory: Option<Box<dyn ConnectionFactory>>,
    digest: ChallengeDigest,
    objects: ObjectRegistry,
    connections: HashMap<ConnectionKey, ConnectionRecord>,
    addresses: HashMap<SocketAddr, ConnectionKey>,
    pending: HashMap<ConnectionKey, PendingConnection>,
    next_timeout_check: Option<GameInstant>,
    events: VecDeque<InterfaceEvent>,
}

impl NetInterface {
    /// Fails only when the system random source cannot seed the handshake
    /// key
    pub fn new(config: InterfaceConfig) -> Result<Self, InterfaceError> {
        Ok(Self {
            config,
            key_generator: KeyGenerator::new(),
            sender: None,
            receiver: None,
            factory: None,
            digest: ChallengeDigest::new()?,
            objects: ObjectRegistry::new(),
            connections: HashMap::new(),
            addresses: HashMap::new(),
            pending: HashMap::new(),
            next_timeout_check: None,
            events: VecDeque::new(),
        })
    }

    /// Attaches the transport network connections use
    pub fn listen<S, R>(&mut self, sender: S, receiver: R)
    where
        S: PacketSender + 'static,
        R: PacketReceiver + 'static,
    {
        self.sender = Some(Box::new(sender));
        self.receiver = Some(Box::new(receiver));
    }

    /// Sets the factory that builds connections for incoming peers. Without
    /// one every connect request is refused.
    pub fn set_connection_factory<F: ConnectionFactory + 'static>(&mut self, factory: F) {
        self.factory = Some(Box::new(factory));
    }

    pub fn set_allow_connections(&mut self, allow: bool) {
        self.config.allow_connections = allow;
    }

    // Accessors

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    /// Objects ghosted to every connection that ghosts from this side
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.objects
    }

    pub fn connection(&self, key: &ConnectionKey) -> Option<&NetConnection> {
        self.connections.get(key).map(|record| &record.connection)
    }

    pub fn connection_mut(&mut self, key: &ConnectionKey) -> Option<&mut NetConnection> {
        self.connections
            .get_mut(key)
            .map(|record| &mut record.connection)
    }

    pub fn connection_keys(&self) -> Vec<ConnectionKey> {
        self.connections.keys().copied().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_pending(&self, key: &ConnectionKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn address_of(&self, key: &ConnectionKey) -> Option<SocketAddr> {
        match self.connections.get(key)?.route {
            Route::Network(address) => Some(address),
            Route::Local(_) => None,
        }
    }

    pub fn find_connection(&self, address: &SocketAddr) -> Option<ConnectionKey> {
        self.addresses.get(address).copied()
    }

    pub fn take_events(&mut self) -> Vec<InterfaceEvent> {
        self.events.drain(..).collect()
    }

    // Connecting

    /// Starts connecting `connection` to the server at `address`. The
    /// returned key stays pending until the server accepts.
    pub fn connect(
        &mut self,
        connection: NetConnection,
        address: SocketAddr,
        now: GameInstant,
    ) -> Result<ConnectionKey, InterfaceError> {
        if self.sender.is_none() {
            return Err(InterfaceError::NoTransport);
        }
        let address_in_use = self.addresses.contains_key(&address)
            || self.pending.values().any(|pending| pending.address == address);
        if address_in_use {
            return Err(InterfaceError::AddressInUse { address });
        }

        let key = self.key_generator.generate();
        let mut pending = PendingConnection {
            address,
            connect_sequence: fastrand::u32(..),
            state: HandshakeState::AwaitingChallengeResponse,
            retries_left: self.config.connect_retry_count,
            next_send_time: now.add_millis(self.config.connect_retry_interval_ms),
            connection,
        };
        pending.connection.set_connect_sequence(pending.connect_sequence);
        info!("NetInterface: connecting to {}", address);
        self.send_handshake_step(&mut pending);
        self.pending.insert(key, pending);
        Ok(key)
    }

    /// Connects two in-process connections, `client` initiating
    pub fn connect_local(
        &mut self,
        mut client: NetConnection,
        mut server: NetConnection,
    ) -> Result<(ConnectionKey, ConnectionKey), InterfaceError> {
        NetConnection::connect_local(&mut client, &mut server)?;

        let client_key = self.key_generator.generate();
        let server_key = self.key_generator.generate();
        self.connections.insert(
            client_key,
            ConnectionRecord {
                route: Route::Local(server_key),
                connect_sequence: 0,
                connection: client,
            },
        );
        self.connections.insert(
            server_key,
            ConnectionRecord {
                route: Route::Local(client_key),
                connect_sequence: 0,
                connection: server,
            },
        );
        self.events.push_back(InterfaceEvent::Connected { key: client_key });
        self.events.push_back(InterfaceEvent::Connected { key: server_key });
        Ok((client_key, server_key))
    }

    /// Tears a connection down, telling the peer why. Also cancels a
    /// pending connection attempt.
    pub fn disconnect(
        &mut self,
        key: &ConnectionKey,
        reason: &str,
        now: GameInstant,
    ) -> Result<(), InterfaceError> {
        if let Some(mut pending) = self.pending.remove(key) {
            info!("NetInterface: connect to {} cancelled", pending.address);
            pending.connection.on_remove(now);
            return Ok(());
        }

        let Some(mut record) = self.connections.remove(key) else {
            return Err(InterfaceError::UnknownConnection { key: *key });
        };
        match record.route {
            Route::Network(address) => {
                self.addresses.remove(&address);
                let mut writer = oob_writer(OobPacketType::Disconnect, record.connect_sequence);
                reason.to_string().ser(&mut writer);
                self.send_to(&address, &writer.to_bytes());
            }
            Route::Local(peer_key) => {
                if let Some(mut peer) = self.connections.remove(&peer_key) {
                    peer.connection.handler_mut().on_disconnect(reason);
                    peer.connection.on_remove(now);
                    self.events.push_back(InterfaceEvent::Disconnected {
                        key: peer_key,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        info!("NetInterface: disconnected {:?}: {}", key, reason);
        record.connection.on_remove(now);
        Ok(())
    }

    // Ghosting

    /// Starts ghosting the interface's objects to a connection
    pub fn activate_ghosting(&mut self, key: &ConnectionKey) -> Result<(), InterfaceError> {
        let record = self
            .connections
            .get_mut(key)
            .ok_or(InterfaceError::UnknownConnection { key: *key })?;
        record.connection.activate_ghosting(&self.objects)?;
        Ok(())
    }

    // Ticking

    /// Reads every waiting datagram, advances handshakes and drops
    /// connections that timed out
    pub fn process(&mut self, now: GameInstant) {
        let mut received = Vec::new();
        if let Some(receiver) = self.receiver.as_mut() {
            loop {
                match receiver.receive() {
                    Ok(Some((address, payload))) => received.push((address, payload.to_vec())),
                    Ok(None) => break,
                    Err(error) => {
                        warn!("NetInterface: {}", error);
                        break;
                    }
                }
            }
        }
        for (address, packet) in received {
            self.handle_packet(now, address, &packet);
        }

        self.process_pending(now);
        self.check_timeouts(now);
        self.flush_outgoing(now);
    }

    /// Fans object changes out to every connection, lets each established
    /// connection build a packet if its rate allows and sends the results
    pub fn send_packets(&mut self, now: GameInstant) {
        let changes = self.objects.take_changes();
        for record in self.connections.values_mut() {
            if !changes.is_empty() {
                record.connection.apply_object_changes(&changes, &self.objects);
            }
            if record.connection.is_established() {
                record.connection.check_packet_send(now, &self.objects, false);
            }
        }
        self.flush_outgoing(now);
    }

    fn flush_outgoing(&mut self, now: GameInstant) {
        let sender = self.sender.as_deref();
        let mut local_deliveries = Vec::new();
        for record in self.connections.values_mut() {
            let packets = record.connection.take_outgoing_packets();
            if packets.is_empty() {
                continue;
            }
            match record.route {
                Route::Network(address) => {
                    let Some(sender) = sender else {
                        continue;
                    };
                    for packet in packets {
                        if let Err(error) = sender.send(&address, &packet) {
                            warn!("NetInterface: {}", error);
                        }
                    }
                }
                Route::Local(peer_key) => local_deliveries.push((peer_key, packets)),
            }
        }

        for (peer_key, packets) in local_deliveries {
            let Some(peer) = self.connections.get_mut(&peer_key) else {
                continue;
            };
            for packet in packets {
                peer.connection.process_raw_packet(now, &packet);
            }
        }
    }

    fn check_timeouts(&mut self, now: GameInstant) {
        let next_check = *self.next_timeout_check.get_or_insert(now);
        if !now.has_reached(&next_check) {
            return;
        }
        self.next_timeout_check = Some(now.add_millis(self.config.timeout_check_interval_ms));

        let timed_out: Vec<ConnectionKey> = self
            .connections
            .iter_mut()
            .filter(|(_, record)| matches!(record.route, Route::Network(_)))
            .filter_map(|(key, record)| record.connection.check_timeout(now).then_some(*key))
            .collect();
        for key in timed_out {
            if let Some(mut record) = self.connections.remove(&key) {
                if let Route::Network(address) = record.route {
                    info!("NetInterface: connection to {} timed out", address);
                    self.addresses.remove(&address);
                }
                record.connection.handler_mut().on_timed_out();
                record.connection.on_remove(now);
                self.events.push_back(InterfaceEvent::TimedOut { key });
            }
        }
    }

    fn process_pending(&mut self, now: GameInstant) {
        let due: Vec<ConnectionKey> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.has_reached(&pending.next_send_time))
            .map(|(key, _)| *key)
            .collect();

        for key in due {
            let Some(mut pending) = self.pending.remove(&key) else {
                continue;
            };
            if pending.retries_left == 0 {
                info!("NetInterface: connect to {} timed out", pending.address);
                pending.connection.handler_mut().on_connect_timed_out();
                pending.connection.on_remove(now);
                self.events.push_back(InterfaceEvent::ConnectTimedOut { key });
                continue;
            }
            pending.retries_left -= 1;
            pending.next_send_time = now.add_millis(self.config.connect_retry_interval_ms);
            self.send_handshake_step(&mut pending);
            self.pending.insert(key, pending);
        }
    }

    // Packets

    fn handle_packet(&mut self, now: GameInstant, address: SocketAddr, packet: &[u8]) {
        if is_connected_packet(packet) {
            let record = self
                .addresses
                .get(&address)
                .and_then(|key| self.connections.get_mut(key));
            match record {
                Some(record) => record.connection.process_raw_packet(now, packet),
                None => trace!("NetInterface: packet from unknown address {}", address),
            }
            return;
        }

        let mut reader = BitReader::new(packet);
        let Ok(header) = OobHeader::de(&mut reader) else {
            warn!("NetInterface: invalid packet from {}", address);
            return;
        };
        let sequence = header.connect_sequence;
        match header.packet_type {
            OobPacketType::ConnectChallengeRequest => self.handle_challenge_request(address, sequence),
            OobPacketType::ConnectChallengeResponse => {
                let Ok(digest) = u64::de(&mut reader) else {
                    warn!("NetInterface: invalid challenge response from {}", address);
                    return;
                };
                self.handle_challenge_response(address, sequence, digest);
            }
            OobPacketType::ConnectRequest => {
                self.handle_connect_request(now, address, sequence, &mut reader)
            }
            OobPacketType::ConnectChallengeReject | OobPacketType::ConnectReject => {
                let reason = String::de(&mut reader).unwrap_or_default();
                self.handle_reject(now, address, sequence, reason);
            }
            OobPacketType::ConnectAccept => {
                self.handle_connect_accept(now, address, sequence, &mut reader)
            }
            OobPacketType::Disconnect => {
                let reason = String::de(&mut reader).unwrap_or_default();
                self.handle_disconnect(now, address, sequence, reason);
            }
        }
    }

    // Server side

    fn accepts_connections(&self) -> bool {
        self.config.allow_connections && self.factory.is_some()
    }

    fn handle_challenge_request(&mut self, address: SocketAddr, sequence: u32) {
        if !self.accepts_connections() {
            debug!("NetInterface: rejecting challenge from {}", address);
            let mut writer = oob_writer(OobPacketType::ConnectChallengeReject, sequence);
            NOT_ACCEPTING_REASON.to_string().ser(&mut writer);
            self.send_to(&address, &writer.to_bytes());
            return;
        }
        let mut writer = oob_writer(OobPacketType::ConnectChallengeResponse, sequence);
        self.digest.compute(&address, sequence).ser(&mut writer);
        self.send_to(&address, &writer.to_bytes());
    }

    fn handle_connect_request(
        &mut self,
        now: GameInstant,
        address: SocketAddr,
        sequence: u32,
        reader: &mut BitReader,
    ) {
        let Ok(digest) = u64::de(reader) else {
            warn!("NetInterface: invalid connect request from {}", address);
            return;
        };
        // SECURITY: only addresses that received our challenge may connect
        if !self.digest.verify(&address, sequence, digest) {
            warn!("NetInterface: connect request with a bad digest from {}", address);
            return;
        }

        if let Some(key) = self.addresses.get(&address).copied() {
            let duplicate = self
                .connections
                .get(&key)
                .is_some_and(|record| record.connect_sequence == sequence);
            if duplicate {
                // our accept was lost
                self.send_connect_accept(&key, address, sequence);
                return;
            }
            // the peer restarted with a new attempt
            info!("NetInterface: {} reconnected, dropping old connection", address);
            self.addresses.remove(&address);
            if let Some(mut record) = self.connections.remove(&key) {
                record.connection.on_remove(now);
                self.events.push_back(InterfaceEvent::Disconnected {
                    key,
                    reason: REFUSED_REASON.to_string(),
                });
            }
        }

        if !self.config.allow_connections {
            self.send_reject(&address, sequence, NOT_ACCEPTING_REASON);
            return;
        }
        let Some(mut connection) = self
            .factory
            .as_mut()
            .and_then(|factory| factory.create(&address))
        else {
            self.send_reject(&address, sequence, REFUSED_REASON);
            return;
        };

        connection.set_connect_sequence(sequence);
        if let Err(reason) = connection.read_connect_request(reader) {
            info!("NetInterface: refused {}: {}", address, reason);
            self.send_reject(&address, sequence, &reason);
            return;
        }

        let key = self.key_generator.generate();
        self.connections.insert(
            key,
            ConnectionRecord {
                route: Route::Network(address),
                connect_sequence: sequence,
                connection,
            },
        );
        self.addresses.insert(address, key);
        self.send_connect_accept(&key, address, sequence);

        if let Some(record) = self.connections.get_mut(&key) {
            if let Err(error) = record.connection.connection_established(false) {
                warn!("NetInterface: {}", error);
            }
        }
        info!("NetInterface: accepted connection from {}", address);
        self.events.push_back(InterfaceEvent::Connected { key });
    }

    fn send_connect_accept(&mut self, key: &ConnectionKey, address: SocketAddr, sequence: u32) {
        let Some(record) = self.connections.get_mut(key) else {
            return;
        };
        let mut writer = oob_writer(OobPacketType::ConnectAccept, sequence);
        record.connection.write_connect_accept(&mut writer);
        let bytes = writer.to_bytes();
        self.send_to(&address, &bytes);
    }

    fn send_reject(&self, address: &SocketAddr, sequence: u32, reason: &str) {
        let mut writer = oob_writer(OobPacketType::ConnectReject, sequence);
        reason.to_string().ser(&mut writer);
        self.send_to(address, &writer.to_bytes());
    }

    // Client side

    fn find_pending(&self, address: &SocketAddr, sequence: u32) -> Option<ConnectionKey> {
        self.pending
            .iter()
            .find(|(_, pending)| pending.address == *address && pending.connect_sequence == sequence)
            .map(|(key, _)| *key)
    }

    fn handle_challenge_response(&mut self, address: SocketAddr, sequence: u32, digest: u64) {
        let Some(key) = self.find_pending(&address, sequence) else {
            return;
        };
        let Some(mut pending) = self.pending.remove(&key) else {
            return;
        };
        if pending.state == HandshakeState::AwaitingChallengeResponse {
            debug!("NetInterface: challenge answered by {}", address);
            pending.state = HandshakeState::AwaitingConnectAccept { digest };
            pending.retries_left = self.config.connect_retry_count;
            self.send_handshake_step(&mut pending);
        }
        self.pending.insert(key, pending);
    }

    fn handle_reject(&mut self, now: GameInstant, address: SocketAddr, sequence: u32, reason: String) {
        let Some(key) = self.find_pending(&address, sequence) else {
            return;
        };
        let Some(mut pending) = self.pending.remove(&key) else {
            return;
        };
        info!("NetInterface: {} rejected the connection: {}", address, reason);
        pending.connection.handler_mut().on_connection_rejected(&reason);
        pending.connection.on_remove(now);
        self.events.push_back(InterfaceEvent::Rejected { key, reason });
    }

    fn handle_connect_accept(
        &mut self,
        now: GameInstant,
        address: SocketAddr,
        sequence: u32,
        reader: &mut BitReader,
    ) {
        let Some(key) = self.find_pending(&address, sequence) else {
            return;
        };
        let awaiting_accept = self.pending.get(&key).is_some_and(|pending| {
            matches!(pending.state, HandshakeState::AwaitingConnectAccept { .. })
        });
        if !awaiting_accept {
            return;
        }
        let Some(mut pending) = self.pending.remove(&key) else {
            return;
        };

        if let Err(reason) = pending.connection.read_connect_accept(reader) {
            warn!("NetInterface: bad connect accept from {}: {}", address, reason);
            pending.connection.handler_mut().handle_startup_error(&reason);
            pending.connection.on_remove(now);
            self.events.push_back(InterfaceEvent::Rejected { key, reason });
            return;
        }
        if let Err(error) = pending.connection.connection_established(true) {
            warn!("NetInterface: {}", error);
        }

        info!("NetInterface: connected to {}", address);
        self.connections.insert(
            key,
            ConnectionRecord {
                route: Route::Network(address),
                connect_sequence: sequence,
                connection: pending.connection,
            },
        );
        self.addresses.insert(address, key);
        self.events.push_back(InterfaceEvent::Connected { key });
    }

    fn handle_disconnect(&mut self, now: GameInstant, address: SocketAddr, sequence: u32, reason: String) {
        let Some(key) = self.addresses.get(&address).copied() else {
            return;
        };
        let matches_sequence = self
            .connections
            .get(&key)
            .is_some_and(|record| record.connect_sequence == sequence);
        if !matches_sequence {
            return;
        }
        self.addresses.remove(&address);
        if let Some(mut record) = self.connections.remove(&key) {
            info!("NetInterface: {} disconnected: {}", address, reason);
            record.connection.handler_mut().on_disconnect(&reason);
            record.connection.on_remove(now);
            self.events.push_back(InterfaceEvent::Disconnected { key, reason });
        }
    }

    fn send_handshake_step(&self, pending: &mut PendingConnection) {
        let bytes = match pending.state {
            HandshakeState::AwaitingChallengeResponse => {
                oob_writer(OobPacketType::ConnectChallengeRequest, pending.connect_sequence).to_bytes()
            }
            HandshakeState::AwaitingConnectAccept { digest } => {
                let mut writer = oob_writer(OobPacketType::ConnectRequest, pending.connect_sequence);
                digest.ser(&mut writer);
                pending.connection.write_connect_request(&mut writer);
                writer.to_bytes()
            }
        };
        self.send_to(&pending.address, &bytes);
    }

    fn send_to(&self, address: &SocketAddr, payload: &[u8]) {
        let Some(sender) = self.sender.as_ref() else {
            warn!("NetInterface: no transport to reach {}", address);
            return;
        };
        if let Err(error) = sender.send(address, payload) {
            warn!("NetInterface: {}", error);
        }
    }
}

fn oob_writer(packet_type: OobPacketType, connect_sequence: u32) -> BitWriter {
    let mut writer = BitWriter::new();
    OobHeader::new(packet_type, connect_sequence).ser(&mut writer);
    writer
}
