use std::{collections::VecDeque, sync::Arc};

use ghostnet_serde::{BitReader, BitWrite, BitWriter, Serde};
use log::{debug, info, trace, warn};

use crate::{
    connection::{
        connection_config::ConnectionConfig,
        connection_protocol::ConnectionProtocol,
        demo::{DemoBlockType, DemoPlayer, DemoRecorder},
        error::ConnectionError,
        handler::ConnectionHandler,
        link_conditioner::{LinkConditioner, LinkConditionerConfig},
        packet_notify::{PacketNotify, PacketNotifyQueue},
        packet_type::PacketType,
        rate::{RateControl, RatePrefs},
    },
    events::{
        event_manager::EventManager,
        file_events::FileChunkEvent,
        net_event::{downcast_event, event_is, NetEvent},
        net_string_event::NetStringEvent,
    },
    files::{
        file_store::{FileStore, MemoryFileStore},
        file_transfer::FileTransfer,
    },
    game_time::GameInstant,
    ghosts::{
        ghost_manager::{GhostManager, GHOST_SECTION_RESERVED_BITS},
        ghost_receiver::{GhostEvent, GhostReceiver},
        object_registry::{ObjectChange, ObjectId, ObjectRegistry},
        replicable::Replicable,
        scope::ScopeQuery,
    },
    pack_context::{PackContext, UnpackContext},
    strings::string_table::{StringLookup, StringTable},
    types::{GhostIndex, HostType},
    Protocol,
};

/// Reason given to a peer whose protocol does not match ours
pub const INVALID_CLASS_REASON: &str = "CHR_INVALID";

const INVALID_PACKET: &str = "Invalid packet.";

cfg_if! {
    if #[cfg(feature = "debug_net")] {
        fn report_protocol_error(error: &str) {
            panic!("NetConnection: {}", error);
        }
    } else {
        fn report_protocol_error(error: &str) {
            warn!("NetConnection: {}", error);
        }
    }
}

/// One end of a logical link to a peer.
///
/// A connection is driven entirely by its owner: received datagrams go to
/// [`Self::process_raw_packet`], [`Self::check_packet_send`] runs once per
/// tick, and outgoing datagrams are collected with
/// [`Self::take_outgoing_packets`]. Every time-dependent call takes the
/// current [`GameInstant`].
pub struct NetConnection {
    pub(super) protocol: Arc<Protocol>,
    pub(super) config: ConnectionConfig,
    pub(super) host_type: HostType,
    pub(super) is_local: bool,
    pub(super) established: bool,
    pub(super) handler: Box<dyn ConnectionHandler>,

    pub(super) connection_protocol: ConnectionProtocol,
    pub(super) rate: RateControl,
    pub(super) notifies: PacketNotifyQueue,
    last_update_time: GameInstant,
    send_delay_credit: u32,
    last_ping_send_time: Option<GameInstant>,
    ping_send_count: u32,
    pub(super) round_trip_time: f32,
    pub(super) packet_loss: f32,
    conditioner: Option<LinkConditioner>,
    outgoing: VecDeque<Vec<u8>>,

    pub(super) events: EventManager,
    pub(super) incoming_events: VecDeque<Box<dyn NetEvent>>,
    pub(super) strings: Option<StringTable>,
    pub(super) ghost_from: Option<GhostManager>,
    pub(super) ghost_to: Option<GhostReceiver>,
    pub(super) files: FileTransfer,
    pub(super) file_store: Box<dyn FileStore>,

    error_buffer: Option<String>,
    last_error: Option<String>,

    pub(super) demo_recorder: Option<DemoRecorder>,
    pub(super) demo_player: Option<DemoPlayer>,
}

impl NetConnection {
    pub fn new(
        protocol: Arc<Protocol>,
        config: ConnectionConfig,
        host_type: HostType,
        handler: Box<dyn ConnectionHandler>,
    ) -> Self {
        let conditioner = config
            .link_conditioner
            .filter(LinkConditionerConfig::is_active)
            .map(|conditioner| LinkConditioner::new(conditioner, config.rng_seed));
        let rate = RateControl::new(config.rate_prefs);

        Self {
            protocol,
            host_type,
            is_local: false,
            established: false,
            handler,
            connection_protocol: ConnectionProtocol::new(),
            rate,
            notifies: PacketNotifyQueue::new(),
            last_update_time: GameInstant::default(),
            send_delay_credit: 0,
            last_ping_send_time: None,
            ping_send_count: 0,
            round_trip_time: 0.0,
            packet_loss: 0.0,
            conditioner,
            outgoing: VecDeque::new(),
            events: EventManager::new(host_type),
            incoming_events: VecDeque::new(),
            strings: None,
            ghost_from: None,
            ghost_to: None,
            files: FileTransfer::new(),
            file_store: Box::new(MemoryFileStore::new()),
            error_buffer: None,
            last_error: None,
            demo_recorder: None,
            demo_player: None,
            config,
        }
    }

    // Accessors

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn is_connection_to_server(&self) -> bool {
        self.host_type == HostType::Client
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// A connection that talks to a remote host over a transport
    pub fn is_network_connection(&self) -> bool {
        !self.is_local && self.demo_player.is_none()
    }

    /// Smoothed round trip time in milliseconds
    pub fn get_ping(&self) -> f32 {
        self.round_trip_time
    }

    /// Smoothed fraction of Data packets lost, from 0.0 to 1.0
    pub fn get_packet_loss(&self) -> f32 {
        self.packet_loss
    }

    pub fn rate(&self) -> &RateControl {
        &self.rate
    }

    pub fn connection_protocol(&self) -> &ConnectionProtocol {
        &self.connection_protocol
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pending_notify_count(&self) -> usize {
        self.notifies.len()
    }

    pub fn handler(&self) -> &dyn ConnectionHandler {
        self.handler.as_ref()
    }

    pub fn handler_mut(&mut self) -> &mut dyn ConnectionHandler {
        self.handler.as_mut()
    }

    pub fn file_store(&self) -> &dyn FileStore {
        self.file_store.as_ref()
    }

    // Settings

    fn check_not_established(&self, setting: &'static str) -> Result<(), ConnectionError> {
        if self.established {
            return Err(ConnectionError::AlreadyEstablished { setting });
        }
        Ok(())
    }

    pub fn set_is_local(&mut self, is_local: bool) {
        self.is_local = is_local;
        if let Some(ghost_from) = self.ghost_from.as_mut() {
            ghost_from.set_is_local(is_local);
        }
    }

    pub fn set_connect_sequence(&mut self, connect_sequence: u32) {
        self.connection_protocol.set_connect_sequence(connect_sequence);
    }

    pub fn set_sending_events(&mut self, sending: bool) -> Result<(), ConnectionError> {
        self.check_not_established("event sending")?;
        self.events.set_sending_events(sending);
        Ok(())
    }

    pub fn set_translates_strings(&mut self, translates: bool) -> Result<(), ConnectionError> {
        self.check_not_established("string translation")?;
        self.strings = translates.then(StringTable::new);
        Ok(())
    }

    /// Makes this side send ghosts of registry objects
    pub fn set_ghost_from(&mut self, ghost_from: bool) -> Result<(), ConnectionError> {
        self.check_not_established("ghost_from")?;
        self.ghost_from = ghost_from.then(|| GhostManager::new(self.is_local));
        Ok(())
    }

    /// Makes this side receive ghosts
    pub fn set_ghost_to(&mut self, ghost_to: bool) -> Result<(), ConnectionError> {
        self.check_not_established("ghost_to")?;
        self.ghost_to = ghost_to.then(GhostReceiver::new);
        Ok(())
    }

    pub fn set_rate_prefs(&mut self, prefs: RatePrefs) {
        self.rate.set_prefs(prefs);
    }

    /// Drops `packet_loss` of outgoing Data packets and delays the rest by
    /// `ping_ms`
    pub fn set_simulated_net_params(&mut self, packet_loss: f32, ping_ms: u32) {
        let config = LinkConditionerConfig::new(packet_loss, ping_ms);
        if !config.is_active() {
            self.conditioner = None;
            return;
        }
        match self.conditioner.as_mut() {
            Some(conditioner) => conditioner.set_config(config),
            None => self.conditioner = Some(LinkConditioner::new(config, self.config.rng_seed)),
        }
    }

    pub fn set_file_store(&mut self, store: Box<dyn FileStore>) {
        self.file_store = store;
    }

    pub fn set_scope_query(&mut self, query: Box<dyn ScopeQuery>) {
        match self.ghost_from.as_mut() {
            Some(ghost_from) => ghost_from.set_scope_query(query),
            None => warn!("NetConnection: scope query set on a connection that does not ghost"),
        }
    }

    // Handshake

    pub fn write_connect_request(&mut self, writer: &mut dyn BitWrite) {
        self.protocol.net_class_group.ser(writer);
        self.protocol.class_crc().ser(writer);
        self.handler.write_connect_request(writer);
    }

    /// Accepts or refuses a peer's connect request, giving the refusal reason
    pub fn read_connect_request(&mut self, reader: &mut BitReader) -> Result<(), String> {
        let class_group = u32::de(reader).map_err(|_| INVALID_CLASS_REASON.to_string())?;
        let class_crc = u32::de(reader).map_err(|_| INVALID_CLASS_REASON.to_string())?;
        if class_group != self.protocol.net_class_group || class_crc != self.protocol.class_crc() {
            info!("NetConnection: refusing peer with a different protocol");
            return Err(INVALID_CLASS_REASON.to_string());
        }
        self.handler.read_connect_request(reader)
    }

    pub fn write_connect_accept(&mut self, writer: &mut dyn BitWrite) {
        self.handler.write_connect_accept(writer);
    }

    pub fn read_connect_accept(&mut self, reader: &mut BitReader) -> Result<(), String> {
        self.handler.read_connect_accept(reader)
    }

    /// Completes the handshake on this side
    pub fn connection_established(&mut self, is_initiator: bool) -> Result<(), ConnectionError> {
        if self.established {
            return Err(ConnectionError::AlreadyEstablished {
                setting: "established",
            });
        }
        self.established = true;
        info!(
            "NetConnection: established ({:?}, {})",
            self.host_type,
            if self.is_local { "local" } else { "network" }
        );
        self.handler.on_connection_established(is_initiator);
        Ok(())
    }

    /// Runs the whole handshake between two in-process connections
    pub fn connect_local(client: &mut NetConnection, server: &mut NetConnection) -> Result<(), ConnectionError> {
        client.set_is_local(true);
        server.set_is_local(true);
        client.set_connect_sequence(0);
        server.set_connect_sequence(0);

        let mut request = BitWriter::new();
        client.write_connect_request(&mut request);
        let request = request.to_bytes();
        if let Err(reason) = server.read_connect_request(&mut BitReader::new(&request)) {
            client.handler.on_connection_rejected(&reason);
            return Err(ConnectionError::Rejected { reason });
        }

        let mut accept = BitWriter::new();
        server.write_connect_accept(&mut accept);
        let accept = accept.to_bytes();
        if let Err(reason) = client.read_connect_accept(&mut BitReader::new(&accept)) {
            client.handler.handle_startup_error(&reason);
            return Err(ConnectionError::Rejected { reason });
        }

        client.connection_established(true)?;
        server.connection_established(false)?;
        Ok(())
    }

    // Timeouts

    /// Any accepted packet shows the peer is alive
    pub fn keep_alive(&mut self, now: GameInstant) {
        self.last_ping_send_time = Some(now);
        self.ping_send_count = 0;
    }

    /// Pings a silent peer; returns true once the retries are exhausted and
    /// the connection should be dropped
    pub fn check_timeout(&mut self, now: GameInstant) -> bool {
        if !self.is_network_connection() {
            return false;
        }
        let Some(last_ping) = self.last_ping_send_time else {
            self.last_ping_send_time = Some(now);
            return false;
        };
        if now.elapsed_since(&last_ping) <= self.config.ping_timeout_ms {
            return false;
        }
        if self.ping_send_count >= self.config.ping_retry_count {
            info!("NetConnection: timed out after {} pings", self.ping_send_count);
            return true;
        }
        self.last_ping_send_time = Some(now);
        self.ping_send_count += 1;
        self.send_control_packet(PacketType::Ping);
        false
    }

    // Sending

    /// Builds and sends a Data packet if pacing and the send window allow.
    /// `force` skips the pacing check. Returns true if a packet was built.
    pub fn check_packet_send(&mut self, now: GameInstant, objects: &ObjectRegistry, force: bool) -> bool {
        self.flush_delayed(now);

        if !force {
            let delay = if self.is_connection_to_server() {
                self.rate.prefs().update_delay_to_server()
            } else {
                self.rate.current().update_delay
            };
            let available = now.elapsed_since(&self.last_update_time) + self.send_delay_credit;
            if available < delay {
                return false;
            }
            self.send_delay_credit = (available - delay).min(self.config.send_delay_credit_cap_ms);

            self.record_block(DemoBlockType::SendPacket, &[]);
        }

        if self.connection_protocol.window_full() {
            trace!("NetConnection: send window full");
            return false;
        }

        let mut writer = BitWriter::with_max_bytes(self.rate.current().packet_size as usize);
        self.connection_protocol.write_header(&mut writer, PacketType::Data);
        self.last_update_time = now;

        let mut notify = PacketNotify::new(now);
        let (rate_changed, max_rate_changed) = self.rate.write(&mut writer);
        notify.rate_changed = rate_changed;
        notify.max_rate_changed = max_rate_changed;

        let context = PackContext {
            protocol: &self.protocol,
            objects,
            strings: self.strings.as_ref(),
            host_type: self.host_type,
        };
        if self.ghost_from.is_some() {
            writer.reserve_bits(GHOST_SECTION_RESERVED_BITS);
        }
        notify.events = self.events.write_packet(&mut writer, &context);
        if let Some(ghost_from) = self.ghost_from.as_mut() {
            writer.release_bits(GHOST_SECTION_RESERVED_BITS);
            notify.ghosts = ghost_from.write_packet(&mut writer, &context);
        }
        self.notifies.push(notify);

        let packet = writer.to_bytes();
        debug!(
            "NetConnection: send Data {} ({} bytes)",
            self.connection_protocol.last_send_seq(),
            packet.len()
        );

        if let Some(conditioner) = self.conditioner.as_mut() {
            if conditioner.should_drop() {
                debug!(
                    "NetConnection: simulated loss of Data {}",
                    self.connection_protocol.last_send_seq()
                );
                return true;
            }
            if conditioner.is_delaying() {
                conditioner.delay(now, packet);
                return true;
            }
        }
        self.send_packet(packet);
        true
    }

    fn flush_delayed(&mut self, now: GameInstant) {
        let due = match self.conditioner.as_mut() {
            Some(conditioner) => conditioner.take_due(now),
            None => return,
        };
        for packet in due {
            self.send_packet(packet);
        }
    }

    fn send_control_packet(&mut self, packet_type: PacketType) {
        let mut writer = BitWriter::new();
        self.connection_protocol.write_header(&mut writer, packet_type);
        trace!("NetConnection: send {:?}", packet_type);
        self.send_packet(writer.to_bytes());
    }

    fn send_packet(&mut self, packet: Vec<u8>) {
        // nothing leaves a connection that is replaying a demo
        if self.demo_player.is_some() {
            return;
        }
        self.outgoing.push_back(packet);
    }

    /// Datagrams ready for the transport (or the local peer), in send order
    pub fn take_outgoing_packets(&mut self) -> Vec<Vec<u8>> {
        self.outgoing.drain(..).collect()
    }

    // Receiving

    pub fn process_raw_packet(&mut self, now: GameInstant, packet: &[u8]) {
        self.record_block(DemoBlockType::Packet, packet);

        let mut reader = BitReader::new(packet);
        let header = match self.connection_protocol.read_header(&mut reader) {
            Ok(Some(header)) => header,
            Ok(None) => return,
            Err(_) => {
                warn!("NetConnection: dropping packet with a malformed header");
                return;
            }
        };

        for received in header.notifies {
            self.handle_notify(now, received);
        }
        if header.packet_type == PacketType::Ping {
            self.send_control_packet(PacketType::Ack);
        }
        self.keep_alive(now);

        if header.is_new_data {
            trace!("NetConnection: recv Data {}", header.sequence);
            self.handle_packet(now, &mut reader);
        }
    }

    fn handle_packet(&mut self, now: GameInstant, reader: &mut BitReader) {
        self.error_buffer = None;

        if self.rate.read(reader).is_err() {
            self.set_last_error(INVALID_PACKET);
        } else {
            let outcome = self
                .events
                .read_packet(reader, &self.protocol, &mut self.strings);
            for event in outcome.events {
                self.process_event(now, event);
            }
            match outcome.error {
                Some(error) => self.set_last_error(error),
                None => self.read_ghosts(reader),
            }
        }

        if let Some(error) = self.error_buffer.take() {
            self.handler.connection_error(&error);
        }
    }

    fn read_ghosts(&mut self, reader: &mut BitReader) {
        let Some(ghost_to) = self.ghost_to.as_mut() else {
            return;
        };
        let context = UnpackContext {
            protocol: &self.protocol,
            strings: self.strings.as_ref(),
            host_type: self.host_type,
        };
        if ghost_to.read_packet(reader, &context).is_err() {
            self.set_last_error(INVALID_PACKET);
        }
    }

    /// Resolves the oldest unresolved Data packet
    fn handle_notify(&mut self, now: GameInstant, received: bool) {
        let Some(notify) = self.notifies.pop_oldest() else {
            warn!("NetConnection: notify without a packet in flight");
            return;
        };
        self.resolve_notify(now, notify, received);
    }

    pub(super) fn resolve_notify(&mut self, now: GameInstant, notify: PacketNotify, received: bool) {
        if !received {
            self.rate
                .packet_dropped(notify.rate_changed, notify.max_rate_changed);
        }
        self.packet_loss = self.packet_loss * 0.9 + if received { 0.0 } else { 0.1 };

        if received {
            let elapsed = now.elapsed_since(&notify.send_time) as f32;
            self.round_trip_time = (self.round_trip_time + elapsed) * 0.5;

            for event in self.events.packet_received(notify.events) {
                self.event_delivered(event);
            }
            if let Some(ghost_from) = self.ghost_from.as_mut() {
                ghost_from.packet_received(&notify.ghosts);
            }
        } else {
            for event in self.events.packet_dropped(notify.events) {
                debug!("NetConnection: unguaranteed event lost");
                self.handler.on_event_lost(event.as_ref());
            }
            if let Some(ghost_from) = self.ghost_from.as_mut() {
                ghost_from.packet_dropped(&notify.ghosts);
            }
        }
    }

    fn event_delivered(&mut self, event: Box<dyn NetEvent>) {
        if event_is::<FileChunkEvent>(event.as_ref()) {
            self.send_file_chunk();
            return;
        }
        if let Some(announce) = event.as_any().downcast_ref::<NetStringEvent>() {
            if let Some(strings) = self.strings.as_mut() {
                strings.confirm(announce.index, &announce.string);
            }
        }
    }

    // Errors

    /// Records a protocol error found while reading the current packet
    pub fn set_last_error<S: Into<String>>(&mut self, error: S) {
        let error = error.into();
        report_protocol_error(&error);
        self.last_error = Some(error.clone());
        self.error_buffer = Some(error);
    }

    // Events

    pub fn post_event<E: NetEvent>(&mut self, event: E) -> Result<(), ConnectionError> {
        self.post_boxed_event(Box::new(event))
    }

    pub fn post_boxed_event(&mut self, event: Box<dyn NetEvent>) -> Result<(), ConnectionError> {
        self.events.post(event, &self.protocol)?;
        Ok(())
    }

    pub(super) fn post_internal(&mut self, event: Box<dyn NetEvent>) {
        if let Err(error) = self.events.post(event, &self.protocol) {
            warn!("NetConnection: could not post internal event: {}", error);
        }
    }

    /// Application events received, in processing order
    pub fn take_incoming_events(&mut self) -> Vec<Box<dyn NetEvent>> {
        self.incoming_events.drain(..).collect()
    }

    /// Received application events of type `E`; others stay queued
    pub fn take_events_of<E: NetEvent>(&mut self) -> Vec<E> {
        let mut taken = Vec::new();
        let mut rest = VecDeque::new();
        for event in self.incoming_events.drain(..) {
            if !event_is::<E>(event.as_ref()) {
                rest.push_back(event);
                continue;
            }
            if let Some(event) = downcast_event::<E>(event) {
                taken.push(*event);
            }
        }
        self.incoming_events = rest;
        taken
    }

    pub fn outgoing_event_count(&self) -> usize {
        self.events.pending_count()
    }

    // Strings

    /// Index of `string` in this connection's table, announcing it to the
    /// peer the first time. None when the connection does not translate
    /// strings.
    pub fn check_string(&mut self, string: &str) -> Option<u16> {
        let lookup = self.strings.as_mut()?.check_string(string);
        match lookup {
            StringLookup::Confirmed(index) => Some(index),
            StringLookup::Pending { index, is_new } => {
                if is_new {
                    self.post_internal(Box::new(NetStringEvent::new(index, string.to_string())));
                }
                Some(index)
            }
        }
    }

    pub fn string_table(&self) -> Option<&StringTable> {
        self.strings.as_ref()
    }

    // Ghosts

    pub fn ghost_manager(&self) -> Option<&GhostManager> {
        self.ghost_from.as_ref()
    }

    pub fn ghost_receiver(&self) -> Option<&GhostReceiver> {
        self.ghost_to.as_ref()
    }

    pub fn is_ghosting_from(&self) -> bool {
        self.ghost_from.is_some()
    }

    pub fn is_ghosting_to(&self) -> bool {
        self.ghost_to.is_some()
    }

    /// Ghost events seen since the last call, in arrival order
    pub fn take_ghost_events(&mut self) -> Vec<GhostEvent> {
        self.ghost_to
            .as_mut()
            .map(GhostReceiver::take_events)
            .unwrap_or_default()
    }

    /// The local copy of the peer's object behind `index`
    pub fn resolve_ghost(&self, index: GhostIndex) -> Option<&dyn Replicable> {
        self.ghost_to.as_ref()?.ghost(index)
    }

    /// The object this side ghosts under `index`
    pub fn resolve_object_from_ghost_index(&self, index: GhostIndex) -> Option<ObjectId> {
        self.ghost_from.as_ref()?.resolve_object(index)
    }

    pub fn get_ghost_index(&self, id: ObjectId) -> Option<GhostIndex> {
        self.ghost_from.as_ref()?.get_ghost_index(id)
    }

    /// Feeds registry changes into this connection's ghost table
    pub fn apply_object_changes(&mut self, changes: &[ObjectChange], objects: &ObjectRegistry) {
        let Some(ghost_from) = self.ghost_from.as_mut() else {
            return;
        };
        let context = PackContext {
            protocol: &self.protocol,
            objects,
            strings: self.strings.as_ref(),
            host_type: self.host_type,
        };
        ghost_from.apply_changes(changes, &context);
    }

    pub fn object_local_scope_always(&mut self, id: ObjectId, objects: &ObjectRegistry) {
        if let Some(ghost_from) = self.ghost_from.as_mut() {
            ghost_from.object_local_scope_always(id, objects);
        }
    }

    pub fn object_local_clear_always(&mut self, id: ObjectId) {
        if let Some(ghost_from) = self.ghost_from.as_mut() {
            ghost_from.object_local_clear_always(id);
        }
    }

    // Teardown

    /// Tears the connection down: every packet still in flight resolves as
    /// lost and the event and ghost state is released
    pub fn on_remove(&mut self, now: GameInstant) {
        self.stop_recording();

        while let Some(notify) = self.notifies.pop_oldest() {
            self.resolve_notify(now, notify, false);
        }

        if let Some(ghost_from) = self.ghost_from.as_mut() {
            ghost_from.free_all();
        }
        if let Some(ghost_to) = self.ghost_to.as_mut() {
            ghost_to.clear_all();
        }
        self.events.clear();
        self.outgoing.clear();
        info!("NetConnection: removed");
    }
}
