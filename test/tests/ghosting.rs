/// End-to-end tests for ghosting objects from a server to a client
use std::{cell::Cell, rc::Rc};

use ghostnet_shared::{GhostEvent, GhostIndex, GhostScope, ObjectFlags, ObjectId, ObjectRegistry};
use ghostnet_test::{HandlerCall, PairOptions, Position, TestPair};

fn ghosting_pair() -> TestPair {
    let mut options = PairOptions::default();
    options.ghosting = true;
    let mut pair = TestPair::connected(options);
    let server_key = pair.server_key().expect("server holds the client");
    pair.server
        .activate_ghosting(&server_key)
        .expect("server ghosts to the client");
    pair
}

fn insert_position(pair: &mut TestPair, x: i32, y: i32) -> ObjectId {
    pair.server
        .objects_mut()
        .insert(Box::new(Position::new(x, y)), ObjectFlags::GHOSTABLE)
}

/// Ticks until the client reports a ghost event matching `wanted`,
/// returning the index it names
fn wait_for_ghost_event<F: Fn(&GhostEvent) -> bool>(pair: &mut TestPair, wanted: F) -> GhostIndex {
    let mut found = None;
    pair.tick_until(100, |pair| {
        for event in pair.client_connection().take_ghost_events() {
            if found.is_none() && wanted(&event) {
                found = Some(event.index());
            }
        }
        found.is_some()
    });
    found.expect("ghost event did not arrive")
}

fn client_position(pair: &mut TestPair, index: GhostIndex) -> Option<Position> {
    pair.client_connection()
        .resolve_ghost(index)
        .and_then(|object| object.as_any().downcast_ref::<Position>())
        .cloned()
}

// ========== Lifecycle Tests ==========

#[test]
fn test_ghosting_starts_after_scope_always_phase() {
    let mut pair = ghosting_pair();
    assert!(pair.tick_until(40, |pair| pair
        .server_log
        .contains(&HandlerCall::ReadyForNormalGhosts)));

    assert!(pair
        .client_log
        .contains(&HandlerCall::GhostAlwaysStarted { count: 0 }));
    assert!(pair
        .client_log
        .contains(&HandlerCall::GhostAlwaysObjectsReceived));
    assert!(pair.server_connection().is_ghosting());
}

#[test]
fn test_ghost_is_created_updated_and_deleted() {
    let mut pair = ghosting_pair();
    let id = insert_position(&mut pair, 1, 2);

    let index = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));
    assert_eq!(client_position(&mut pair, index), Some(Position::new(1, 2)));

    // the index is published once the create has been acked
    assert!(pair.tick_until(100, |pair| pair
        .server_connection()
        .get_ghost_index(id)
        .is_some()));
    assert_eq!(pair.server_connection().get_ghost_index(id), Some(index));

    if let Some(position) = pair.server.objects_mut().get_mut_as::<Position>(id) {
        position.x = 10;
    }
    pair.server.objects_mut().set_mask_bits(id, Position::X_MASK);
    assert!(pair.tick_until(100, |pair| client_position(pair, index)
        .map(|position| position.x == 10)
        .unwrap_or(false)));
    assert_eq!(client_position(&mut pair, index), Some(Position::new(10, 2)));

    pair.server.objects_mut().remove(id);
    let deleted = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Deleted { .. }));
    assert_eq!(deleted, index);
    assert_eq!(client_position(&mut pair, index), None);
}

#[test]
fn test_lost_update_is_resent() {
    let mut pair = ghosting_pair();
    let id = insert_position(&mut pair, 0, 0);
    let index = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));

    if let Some(position) = pair.server.objects_mut().get_mut_as::<Position>(id) {
        position.y = -40;
    }
    pair.server.objects_mut().set_mask_bits(id, Position::Y_MASK);
    pair.sockets.server_to_client.drop_next(1);

    assert!(pair.tick_until(100, |pair| client_position(pair, index)
        .map(|position| position.y == -40)
        .unwrap_or(false)));
}

// ========== Scope Tests ==========

#[test]
fn test_object_leaving_scope_is_deleted_and_comes_back() {
    let mut pair = ghosting_pair();
    let visible = Rc::new(Cell::new(true));
    let query_visible = visible.clone();
    pair.server_connection()
        .set_scope_query(Box::new(move |objects: &ObjectRegistry, scope: &mut GhostScope| {
            if query_visible.get() {
                for (id, _, _) in objects.iter() {
                    scope.add(id);
                }
            }
        }));

    insert_position(&mut pair, 5, 5);
    wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));

    visible.set(false);
    wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Deleted { .. }));
    assert_eq!(
        pair.client_connection()
            .ghost_receiver()
            .map(|ghosts| ghosts.ghost_count()),
        Some(0)
    );

    visible.set(true);
    let index = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));
    assert_eq!(client_position(&mut pair, index), Some(Position::new(5, 5)));
}

#[test]
fn test_ghost_index_is_reused_after_kill() {
    let mut pair = ghosting_pair();
    let first = insert_position(&mut pair, 1, 1);
    let first_index = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));

    pair.server.objects_mut().remove(first);
    wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Deleted { .. }));
    assert!(pair.tick_until(100, |pair| pair
        .server_connection()
        .ghost_manager()
        .map(|ghosts| ghosts.ghost_count() == 0)
        .unwrap_or(false)));

    insert_position(&mut pair, 2, 2);
    let second_index = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));
    assert_eq!(second_index, first_index);
    assert_eq!(client_position(&mut pair, second_index), Some(Position::new(2, 2)));
}

#[test]
fn test_reset_ghosting_clears_client() {
    let mut pair = ghosting_pair();
    insert_position(&mut pair, 3, 4);
    wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));

    pair.server_connection().reset_ghosting();
    wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Deleted { .. }));
    assert!(!pair.server_connection().is_ghosting());
}

#[test]
fn test_scope_always_object_is_installed_by_event() {
    let mut options = PairOptions::default();
    options.ghosting = true;
    let mut pair = TestPair::connected(options);
    pair.server.objects_mut().insert(
        Box::new(Position::new(9, 9)),
        ObjectFlags::GHOSTABLE | ObjectFlags::SCOPE_ALWAYS,
    );
    let server_key = pair.server_key().expect("server holds the client");
    pair.server
        .activate_ghosting(&server_key)
        .expect("server ghosts to the client");

    let index = wait_for_ghost_event(&mut pair, |event| matches!(event, GhostEvent::Created { .. }));
    assert_eq!(client_position(&mut pair, index), Some(Position::new(9, 9)));
    assert!(pair
        .client_log
        .contains(&HandlerCall::GhostAlwaysStarted { count: 1 }));
    assert!(pair.tick_until(40, |pair| pair
        .server_log
        .contains(&HandlerCall::ReadyForNormalGhosts)));
}
