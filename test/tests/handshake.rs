/// End-to-end tests for the connect handshake and connection teardown,
/// run over an in-memory socket pair
use ghostnet_interface::InterfaceEvent;
use ghostnet_shared::INVALID_CLASS_REASON;
use ghostnet_test::{protocol_in_group, HandlerCall, PairOptions, TestPair, CLIENT_ADDR, SERVER_ADDR};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

fn fast_retry_options() -> PairOptions {
    let mut options = PairOptions::default();
    options.interface.connect_retry_interval_ms = 100;
    options.interface.connect_retry_count = 2;
    options
}

// ========== Handshake Tests ==========

#[test]
fn test_handshake_establishes_both_sides() {
    init_logging();
    let mut pair = TestPair::connected(PairOptions::default());

    assert!(pair
        .client_log
        .contains(&HandlerCall::Established { is_initiator: true }));
    assert!(pair
        .server_log
        .contains(&HandlerCall::Established { is_initiator: false }));

    let client_key = pair.client_key;
    assert_eq!(pair.client.address_of(&client_key), Some(SERVER_ADDR));
    assert!(!pair.client.is_pending(&client_key));
    assert!(pair.client_connection().is_network_connection());
    assert!(pair.server_connection().is_established());

    let client_events = pair.client.take_events();
    assert_eq!(client_events, vec![InterfaceEvent::Connected { key: client_key }]);
    let server_key = pair.server_key().expect("server holds the client");
    assert_eq!(pair.server.address_of(&server_key), Some(CLIENT_ADDR));
}

#[test]
fn test_other_class_group_is_rejected() {
    let mut options = PairOptions::default();
    options.server_protocol = protocol_in_group(1);
    let mut pair = TestPair::new(options);

    let client_key = pair.client_key;
    assert!(pair.tick_until(20, |pair| !pair.client.is_pending(&client_key)));

    assert!(!pair.is_connected());
    assert_eq!(pair.server.connection_count(), 0);
    assert!(pair.client_log.contains(&HandlerCall::Rejected {
        reason: INVALID_CLASS_REASON.to_string()
    }));
    assert_eq!(
        pair.client.take_events(),
        vec![InterfaceEvent::Rejected {
            key: client_key,
            reason: INVALID_CLASS_REASON.to_string()
        }]
    );
}

#[test]
fn test_handler_refusal_reaches_client() {
    let mut options = PairOptions::default();
    options.refuse_with = Some("Server is full.".to_string());
    let mut pair = TestPair::new(options);

    let client_key = pair.client_key;
    assert!(pair.tick_until(20, |pair| !pair.client.is_pending(&client_key)));

    assert!(pair.client_log.contains(&HandlerCall::Rejected {
        reason: "Server is full.".to_string()
    }));
    assert_eq!(pair.server.connection_count(), 0);
}

#[test]
fn test_server_not_accepting_connections() {
    let mut pair = TestPair::new(PairOptions::default());
    pair.server.set_allow_connections(false);

    let client_key = pair.client_key;
    assert!(pair.tick_until(20, |pair| !pair.client.is_pending(&client_key)));

    let events = pair.client.take_events();
    assert!(matches!(
        events.as_slice(),
        [InterfaceEvent::Rejected { .. }]
    ));
    assert_eq!(pair.client_log.count(|call| matches!(call, HandlerCall::Rejected { .. })), 1);
}

// ========== Retry Tests ==========

#[test]
fn test_lost_challenge_response_is_retried() {
    let mut pair = TestPair::new(fast_retry_options());
    pair.sockets.server_to_client.drop_next(1);

    assert!(pair.tick_until(40, |pair| pair.is_connected()));
    assert_eq!(pair.sockets.server_to_client.dropped_count(), 1);
}

#[test]
fn test_lost_accept_is_sent_again() {
    let mut pair = TestPair::new(fast_retry_options());

    // the server answers the challenge; lose the accept that follows
    pair.tick();
    pair.sockets.server_to_client.drop_next(1);
    pair.tick();
    pair.tick();
    assert_eq!(pair.server.connection_count(), 1);
    assert!(pair.client.is_pending(&pair.client_key));

    assert!(pair.tick_until(40, |pair| pair.is_connected()));
    assert_eq!(pair.server.connection_count(), 1);
    assert_eq!(
        pair.server_log
            .count(|call| matches!(call, HandlerCall::Established { .. })),
        1
    );
}

#[test]
fn test_unanswered_connect_times_out() {
    init_logging();
    let mut pair = TestPair::new(fast_retry_options());
    pair.sockets.server_to_client.set_blocked(true);

    let client_key = pair.client_key;
    assert!(pair.tick_until(40, |pair| !pair.client.is_pending(&client_key)));

    assert!(pair.client_log.contains(&HandlerCall::ConnectTimedOut));
    assert_eq!(
        pair.client.take_events(),
        vec![InterfaceEvent::ConnectTimedOut { key: client_key }]
    );
    assert!(pair.client.connection(&client_key).is_none());
}

// ========== Teardown Tests ==========

#[test]
fn test_disconnect_reaches_peer() {
    let mut pair = TestPair::connected(PairOptions::default());
    let server_key = pair.server_key().expect("server holds the client");
    pair.server.take_events();

    let (client_key, now) = (pair.client_key, pair.now);
    pair.client
        .disconnect(&client_key, "Player quit.", now)
        .expect("client is connected");
    assert_eq!(pair.client.connection_count(), 0);

    assert!(pair.tick_until(5, |pair| pair.server_key().is_none()));
    assert!(pair.server_log.contains(&HandlerCall::Disconnected {
        reason: "Player quit.".to_string()
    }));
    assert_eq!(
        pair.server.take_events(),
        vec![InterfaceEvent::Disconnected {
            key: server_key,
            reason: "Player quit.".to_string()
        }]
    );
}

#[test]
fn test_silent_peer_times_out() {
    init_logging();
    let mut options = PairOptions::default();
    options.connection.ping_timeout_ms = 200;
    options.connection.ping_retry_count = 2;
    options.interface.timeout_check_interval_ms = 50;
    let mut pair = TestPair::connected(options);
    let server_key = pair.server_key().expect("server holds the client");

    pair.sockets.client_to_server.set_blocked(true);
    assert!(pair.tick_until(100, |pair| pair.server_key().is_none()));

    assert!(pair.server_log.contains(&HandlerCall::TimedOut));
    assert!(pair
        .server
        .take_events()
        .contains(&InterfaceEvent::TimedOut { key: server_key }));
    // the client still hears the server's pings
    assert!(!pair.client_log.contains(&HandlerCall::TimedOut));
}
