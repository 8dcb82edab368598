/// End-to-end tests for event delivery between a server and a client
use std::sync::Arc;

use ghostnet_interface::{InterfaceConfig, NetInterface};
use ghostnet_shared::{ConnectionConfig, GameInstant, HostType, NetConnection, ObjectRegistry};
use ghostnet_test::{
    protocol, ChatMessage, HandlerCall, HandlerLog, Numbered, PairOptions, RecordingHandler,
    TestPair, TICK_MS,
};

/// A server and client joined in-process, with packets moved by hand
fn local_pair(server_log: &HandlerLog) -> (NetConnection, NetConnection) {
    let protocol = protocol();
    let mut server = NetConnection::new(
        Arc::clone(&protocol),
        ConnectionConfig::default(),
        HostType::Server,
        Box::new(RecordingHandler::new(server_log.clone())),
    );
    let mut client = NetConnection::new(
        protocol,
        ConnectionConfig::default(),
        HostType::Client,
        Box::new(RecordingHandler::new(HandlerLog::new())),
    );
    NetConnection::connect_local(&mut client, &mut server).expect("same protocol");
    (server, client)
}

/// Sends one forced Data packet from `from` and returns it
fn send_data(from: &mut NetConnection, millis: u32) -> Vec<u8> {
    let objects = ObjectRegistry::new();
    assert!(from.check_packet_send(GameInstant::from_millis(millis), &objects, true));
    let mut packets = from.take_outgoing_packets();
    assert_eq!(packets.len(), 1);
    packets.remove(0)
}

fn deliver(to: &mut NetConnection, millis: u32, packet: &[u8]) {
    to.process_raw_packet(GameInstant::from_millis(millis), packet);
}

/// Ticks until the server has sent one more packet
fn tick_until_server_sends(pair: &mut TestPair) {
    let sent = pair.sockets.server_to_client.sent_count();
    assert!(pair.tick_until(20, |pair| pair.sockets.server_to_client.sent_count() > sent));
}

fn received_values(pair: &mut TestPair, values: &mut Vec<u32>) {
    values.extend(
        pair.client_connection()
            .take_events_of::<Numbered>()
            .into_iter()
            .map(|event| event.value),
    );
}

// ========== Ordered Event Tests ==========

#[test]
fn test_ordered_events_survive_a_lost_packet() {
    let mut pair = TestPair::connected(PairOptions::default());

    pair.server_connection()
        .post_event(Numbered::ordered(1))
        .expect("server may send");
    tick_until_server_sends(&mut pair);

    // the first packet carrying event 2 is lost
    pair.sockets.server_to_client.drop_next(1);
    pair.server_connection()
        .post_event(Numbered::ordered(2))
        .expect("server may send");
    tick_until_server_sends(&mut pair);

    for value in 3..=5 {
        pair.server_connection()
            .post_event(Numbered::ordered(value))
            .expect("server may send");
    }

    let mut values = Vec::new();
    assert!(pair.tick_until(100, |pair| {
        received_values(pair, &mut values);
        values.len() >= 5
    }));
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
    assert_eq!(pair.sockets.server_to_client.dropped_count(), 1);
    assert_eq!(pair.server_connection().outgoing_event_count(), 0);
}

#[test]
fn test_unordered_events_all_arrive() {
    let mut pair = TestPair::connected(PairOptions::default());

    pair.sockets.server_to_client.drop_next(1);
    for value in 1..=5 {
        pair.server_connection()
            .post_event(Numbered::unordered(value))
            .expect("server may send");
    }

    let mut values = Vec::new();
    assert!(pair.tick_until(100, |pair| {
        received_values(pair, &mut values);
        values.len() >= 5
    }));
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_client_cannot_post_server_event() {
    let mut pair = TestPair::connected(PairOptions::default());
    assert!(pair.client_connection().post_event(Numbered::ordered(1)).is_err());
}

// ========== String Table Tests ==========

#[test]
fn test_chat_channel_goes_through_string_table() {
    let mut options = PairOptions::default();
    options.translate_strings = true;
    let mut pair = TestPair::connected(options);

    pair.client_connection().check_string("general");
    assert!(pair.tick_until(40, |pair| {
        pair.client_connection()
            .string_table()
            .and_then(|strings| strings.confirmed_index("general"))
            .is_some()
    }));

    pair.client_connection()
        .post_event(ChatMessage::new("general", "hello"))
        .expect("client may send");

    let mut messages = Vec::new();
    assert!(pair.tick_until(40, |pair| {
        messages.extend(pair.server_connection().take_events_of::<ChatMessage>());
        !messages.is_empty()
    }));
    assert_eq!(messages, vec![ChatMessage::new("general", "hello")]);
}

#[test]
fn test_chat_without_string_table() {
    let mut pair = TestPair::connected(PairOptions::default());
    pair.client_connection()
        .post_event(ChatMessage::new("team", "go"))
        .expect("client may send");

    let mut messages = Vec::new();
    assert!(pair.tick_until(40, |pair| {
        messages.extend(pair.server_connection().take_events_of::<ChatMessage>());
        !messages.is_empty()
    }));
    assert_eq!(messages[0].channel, "team");
}

// ========== Acknowledgement Tests ==========

#[test]
fn test_round_trip_time_is_measured() {
    let mut pair = TestPair::connected(PairOptions::default());
    pair.tick_n(40);

    let client_ping = pair.client_connection().get_ping();
    let server_ping = pair.server_connection().get_ping();
    assert!(client_ping > 0.0 && client_ping < 1000.0, "client ping {}", client_ping);
    assert!(server_ping > 0.0 && server_ping < 1000.0, "server ping {}", server_ping);
    assert!(pair.server_connection().get_packet_loss() < 0.01);
}

#[test]
fn test_round_trip_time_ignores_lost_packets() {
    let log = HandlerLog::new();
    let (mut server, mut client) = local_pair(&log);

    // acked after 50ms
    let first = send_data(&mut server, 100);
    deliver(&mut client, 100, &first);
    let reply = send_data(&mut client, 150);
    deliver(&mut server, 150, &reply);
    assert!((server.get_ping() - 25.0).abs() < 0.001);
    assert_eq!(server.get_packet_loss(), 0.0);

    // lost, then the next packet is acked 50ms after it was sent
    let _lost = send_data(&mut server, 200);
    let third = send_data(&mut server, 250);
    deliver(&mut client, 250, &third);
    let reply = send_data(&mut client, 300);
    deliver(&mut server, 300, &reply);

    // only the acked send moved the average: (25 + 50) / 2
    assert!((server.get_ping() - 37.5).abs() < 0.001, "ping {}", server.get_ping());
    assert!((server.get_packet_loss() - 0.09).abs() < 0.001);
}

#[test]
fn test_lost_packet_alone_leaves_round_trip_time() {
    let log = HandlerLog::new();
    let (mut server, mut client) = local_pair(&log);

    let first = send_data(&mut server, 100);
    deliver(&mut client, 100, &first);
    let reply = send_data(&mut client, 140);
    deliver(&mut server, 140, &reply);
    let ping = server.get_ping();
    assert!(ping > 0.0);

    let _lost = send_data(&mut server, 200);
    server.on_remove(GameInstant::from_millis(900));

    assert_eq!(server.get_ping(), ping);
    assert!(server.get_packet_loss() > 0.0);
}

#[test]
fn test_lost_unguaranteed_event_reaches_handler() {
    let log = HandlerLog::new();
    let (mut server, mut client) = local_pair(&log);

    server
        .post_event(Numbered::unguaranteed(9))
        .expect("server may send");
    let _lost = send_data(&mut server, 100);
    let second = send_data(&mut server, 150);
    deliver(&mut client, 150, &second);
    let reply = send_data(&mut client, 200);
    deliver(&mut server, 200, &reply);

    assert!(log.contains(&HandlerCall::EventLost { value: Some(9) }));
    assert!(client.take_events_of::<Numbered>().is_empty());
    assert_eq!(server.outgoing_event_count(), 0);
}

#[test]
fn test_packet_loss_is_tracked() {
    let mut pair = TestPair::connected(PairOptions::default());
    pair.sockets.server_to_client.drop_next(3);
    pair.tick_n(40);

    assert!(pair.server_connection().get_packet_loss() > 0.0);
}

// ========== Local Connection Tests ==========

#[test]
fn test_local_connections_exchange_events() {
    let protocol = protocol();
    let client_log = HandlerLog::new();
    let client = NetConnection::new(
        Arc::clone(&protocol),
        ConnectionConfig::default(),
        HostType::Client,
        Box::new(RecordingHandler::new(client_log.clone())),
    );
    let server = NetConnection::new(
        protocol,
        ConnectionConfig::default(),
        HostType::Server,
        Box::new(RecordingHandler::new(HandlerLog::new())),
    );

    let mut interface = NetInterface::new(InterfaceConfig::default()).expect("challenge key");
    let (client_key, server_key) = interface
        .connect_local(client, server)
        .expect("same protocol");
    assert!(interface.connection(&client_key).expect("client").is_local());

    interface
        .connection_mut(&server_key)
        .expect("server")
        .post_event(Numbered::ordered(7))
        .expect("server may send");

    let mut now = GameInstant::from_millis(0);
    let mut values = Vec::new();
    for _ in 0..40 {
        now = now.add_millis(TICK_MS);
        interface.process(now);
        interface.send_packets(now);
        values.extend(
            interface
                .connection_mut(&client_key)
                .expect("client")
                .take_events_of::<Numbered>()
                .into_iter()
                .map(|event| event.value),
        );
    }
    assert_eq!(values, vec![7]);
}
