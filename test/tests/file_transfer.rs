/// End-to-end tests for downloading the files a scope-always object needs
use ghostnet_shared::{GhostEvent, MemoryFileStore, ObjectFlags, FILE_CHUNK_SIZE};
use ghostnet_test::{HandlerCall, Level, PairOptions, TestPair};

fn level_pair(server_files: MemoryFileStore) -> TestPair {
    let mut options = PairOptions::default();
    options.ghosting = true;
    options.server_files = server_files;
    let mut pair = TestPair::connected(options);

    pair.server.objects_mut().insert(
        Box::new(Level::new("arena")),
        ObjectFlags::GHOSTABLE | ObjectFlags::SCOPE_ALWAYS,
    );
    let server_key = pair.server_key().expect("server holds the client");
    pair.server
        .activate_ghosting(&server_key)
        .expect("server ghosts to the client");
    pair
}

fn level_data() -> Vec<u8> {
    (0..(FILE_CHUNK_SIZE * 3 + 10)).map(|byte| byte as u8).collect()
}

// ========== Download Tests ==========

#[test]
fn test_missing_file_is_downloaded_before_install() {
    let data = level_data();
    let mut pair = level_pair(MemoryFileStore::new().with_file("arena.lvl", &data));

    assert!(pair.tick_until(200, |pair| pair
        .client_log
        .contains(&HandlerCall::GhostAlwaysObjectsReceived)));

    assert_eq!(pair.client_connection().file_store().read("arena.lvl"), Some(data.clone()));
    let progress = pair.client_log.count(|call| {
        matches!(call, HandlerCall::FileChunkReceived { name, size, .. }
            if name == "arena.lvl" && *size == data.len())
    });
    assert_eq!(progress, 3);

    let events = pair.client_connection().take_ghost_events();
    let index = match events.as_slice() {
        [GhostEvent::Created { index }] => *index,
        other => panic!("Expected one created ghost, got {:?}", other),
    };
    let level = pair
        .client_connection()
        .resolve_ghost(index)
        .and_then(|object| object.as_any().downcast_ref::<Level>())
        .cloned();
    assert_eq!(level, Some(Level::new("arena")));
    assert!(pair.tick_until(40, |pair| pair
        .server_log
        .contains(&HandlerCall::ReadyForNormalGhosts)));
}

#[test]
fn test_unavailable_file_leaves_object_uninstalled() {
    let mut pair = level_pair(MemoryFileStore::new());

    assert!(pair.tick_until(200, |pair| pair
        .client_log
        .count(|call| matches!(call, HandlerCall::ConnectionError { .. }))
        > 0));

    let error = pair
        .client_connection()
        .last_error()
        .map(str::to_string)
        .expect("a missing file is reported");
    assert!(error.contains("arena.lvl"));
    assert!(!pair
        .client_log
        .contains(&HandlerCall::GhostAlwaysObjectsReceived));
    assert!(pair.client_connection().take_ghost_events().is_empty());
}

#[test]
fn test_never_download_files() {
    let data = level_data();
    let mut options = PairOptions::default();
    options.ghosting = true;
    options.server_files = MemoryFileStore::new().with_file("arena.lvl", &data);
    options.connection.never_download_files = true;
    let mut pair = TestPair::connected(options);

    pair.server.objects_mut().insert(
        Box::new(Level::new("arena")),
        ObjectFlags::GHOSTABLE | ObjectFlags::SCOPE_ALWAYS,
    );
    let server_key = pair.server_key().expect("server holds the client");
    pair.server
        .activate_ghosting(&server_key)
        .expect("server ghosts to the client");

    assert!(pair.tick_until(200, |pair| pair.client_connection().last_error().is_some()));
    assert!(!pair.client_connection().file_store().exists("arena.lvl"));
    assert_eq!(
        pair.client_log
            .count(|call| matches!(call, HandlerCall::FileChunkReceived { .. })),
        0
    );
}
