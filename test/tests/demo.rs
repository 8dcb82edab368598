/// End-to-end tests recording a live client connection and replaying it
use std::{cell::Cell, io::Cursor, rc::Rc};

use ghostnet_shared::{
    GameInstant, GhostEvent, GhostIndex, GhostScope, NetConnection, ObjectFlags, ObjectRegistry,
};
use ghostnet_test::{
    helpers::test_pair::client_connection, HandlerCall, HandlerLog, Numbered, PairOptions,
    Position, SharedBuffer, TestPair,
};

/// Replays `demo` into a fresh client connection until it runs out
fn replay(options: &PairOptions, demo: Vec<u8>) -> (ghostnet_shared::NetConnection, HandlerLog) {
    let log = HandlerLog::new();
    let mut connection = client_connection(options, &log);
    connection
        .replay_demo_record(Box::new(Cursor::new(demo)))
        .expect("demo header is valid");
    assert!(connection.is_playing_back());

    let mut now = GameInstant::from_millis(0);
    let mut blocks = 0;
    while connection
        .process_next_demo_block(now)
        .expect("demo blocks are valid")
    {
        now = now.add_millis(10);
        blocks += 1;
        assert!(blocks < 100_000, "demo never ends");
    }
    assert!(!connection.is_playing_back());
    (connection, log)
}

/// What the client saw, in order: event values and ghost changes
#[derive(Debug, Default, PartialEq, Eq)]
struct Observed {
    events: Vec<u32>,
    ghosts: Vec<(&'static str, GhostIndex)>,
}

impl Observed {
    fn drain(&mut self, connection: &mut NetConnection) {
        self.events.extend(
            connection
                .take_events_of::<Numbered>()
                .into_iter()
                .map(|event| event.value),
        );
        self.ghosts.extend(connection.take_ghost_events().into_iter().map(|event| {
            let kind = match event {
                GhostEvent::Created { .. } => "created",
                GhostEvent::Updated { .. } => "updated",
                GhostEvent::Deleted { .. } => "deleted",
            };
            (kind, event.index())
        }));
    }

    fn count(&self, kind: &str) -> usize {
        self.ghosts.iter().filter(|(seen, _)| *seen == kind).count()
    }
}

// ========== Replay Tests ==========

#[test]
fn test_replay_matches_live_session() {
    let mut options = PairOptions::default();
    options.ghosting = true;
    let mut pair = TestPair::connected(options.clone());

    let demo = SharedBuffer::new();
    pair.client_connection()
        .start_demo_record(Box::new(demo.clone()))
        .expect("recording starts");

    let near = pair
        .server
        .objects_mut()
        .insert(Box::new(Position::new(1, 1)), ObjectFlags::GHOSTABLE);
    let far = pair
        .server
        .objects_mut()
        .insert(Box::new(Position::new(50, 50)), ObjectFlags::GHOSTABLE);
    let far_visible = Rc::new(Cell::new(true));
    let query_visible = far_visible.clone();
    pair.server_connection()
        .set_scope_query(Box::new(move |_objects: &ObjectRegistry, scope: &mut GhostScope| {
            scope.add(near);
            if query_visible.get() {
                scope.add(far);
            }
        }));
    let server_key = pair.server_key().expect("server holds the client");
    pair.server
        .activate_ghosting(&server_key)
        .expect("server ghosts to the client");

    // the first packet carrying the events is lost and resent
    pair.sockets.server_to_client.drop_next(1);
    for value in 1..=3 {
        pair.server_connection()
            .post_event(Numbered::ordered(value))
            .expect("server may send");
    }

    let mut live = Observed::default();
    assert!(pair.tick_until(150, |pair| {
        live.drain(pair.client_connection());
        live.events.len() >= 3 && live.count("created") >= 2
    }));

    far_visible.set(false);
    assert!(pair.tick_until(150, |pair| {
        live.drain(pair.client_connection());
        live.count("deleted") >= 1
    }));
    pair.tick_n(2);
    live.drain(pair.client_connection());

    let (client_key, now) = (pair.client_key, pair.now);
    pair.client
        .disconnect(&client_key, "Demo over.", now)
        .expect("client is connected");
    assert!(pair.tick_until(5, |pair| pair.server_key().is_none()));

    assert_eq!(live.events, vec![1, 2, 3]);
    assert_eq!(live.count("created"), 2);
    assert_eq!(live.count("deleted"), 1);
    assert_eq!(pair.sockets.server_to_client.dropped_count(), 1);

    let (mut replayed, log) = replay(&options, demo.bytes());
    let mut replay_observed = Observed::default();
    replay_observed.drain(&mut replayed);
    assert_eq!(replay_observed, live);
    assert!(log.contains(&HandlerCall::DemoPlaybackComplete));
}


#[test]
fn test_replay_reproduces_received_events() {
    let options = PairOptions::default();
    let mut pair = TestPair::connected(options.clone());

    let demo = SharedBuffer::new();
    pair.client_connection()
        .start_demo_record(Box::new(demo.clone()))
        .expect("recording starts");

    pair.sockets.server_to_client.drop_next(1);
    for value in 1..=4 {
        pair.server_connection()
            .post_event(Numbered::ordered(value))
            .expect("server may send");
    }
    let mut live = Vec::new();
    assert!(pair.tick_until(100, |pair| {
        live.extend(
            pair.client_connection()
                .take_events_of::<Numbered>()
                .into_iter()
                .map(|event| event.value),
        );
        live.len() >= 4
    }));
    pair.client_connection().stop_recording();
    assert!(!demo.is_empty());

    let (mut replayed, log) = replay(&options, demo.bytes());
    let values: Vec<u32> = replayed
        .take_events_of::<Numbered>()
        .into_iter()
        .map(|event| event.value)
        .collect();
    assert_eq!(values, live);
    assert!(log.contains(&HandlerCall::DemoPlaybackComplete));
    assert!(replayed.take_outgoing_packets().is_empty());
}

#[test]
fn test_replay_reproduces_ghosts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut options = PairOptions::default();
    options.ghosting = true;
    let mut pair = TestPair::connected(options.clone());

    let demo = SharedBuffer::new();
    pair.client_connection()
        .start_demo_record(Box::new(demo.clone()))
        .expect("recording starts");

    let server_key = pair.server_key().expect("server holds the client");
    pair.server
        .activate_ghosting(&server_key)
        .expect("server ghosts to the client");
    pair.server
        .objects_mut()
        .insert(Box::new(Position::new(-3, 8)), ObjectFlags::GHOSTABLE);

    let mut created = None;
    assert!(pair.tick_until(100, |pair| {
        for event in pair.client_connection().take_ghost_events() {
            if let GhostEvent::Created { index } = event {
                created = Some(index);
            }
        }
        created.is_some()
    }));
    pair.tick_n(4);
    pair.client_connection().stop_recording();
    let index = created.expect("ghost was created");

    let (replayed, _) = replay(&options, demo.bytes());
    let position = replayed
        .resolve_ghost(index)
        .and_then(|object| object.as_any().downcast_ref::<Position>())
        .cloned();
    assert_eq!(position, Some(Position::new(-3, 8)));
}
