use std::{cell::RefCell, rc::Rc};

use ghostnet_shared::{BitReader, ConnectionHandler, NetEvent};

use crate::test_protocol::Numbered;

/// A handler notification, as seen by a [`RecordingHandler`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerCall {
    Established { is_initiator: bool },
    Rejected { reason: String },
    ConnectTimedOut,
    TimedOut,
    Disconnected { reason: String },
    StartupError { error: String },
    ConnectionError { error: String },
    /// A lost unguaranteed event; `value` is set for [`Numbered`] events
    EventLost { value: Option<u32> },
    GhostAlwaysStarted { count: u32 },
    GhostAlwaysObjectsReceived,
    ReadyForNormalGhosts,
    FileChunkReceived { name: String, received: usize, size: usize },
    DemoPlaybackComplete,
}

/// Shared log of every call made on one or more recording handlers
#[derive(Clone, Default)]
pub struct HandlerLog {
    calls: Rc<RefCell<Vec<HandlerCall>>>,
}

impl HandlerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: HandlerCall) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.borrow().clone()
    }

    pub fn contains(&self, call: &HandlerCall) -> bool {
        self.calls.borrow().contains(call)
    }

    pub fn count<F: Fn(&HandlerCall) -> bool>(&self, predicate: F) -> usize {
        self.calls.borrow().iter().filter(|call| predicate(call)).count()
    }
}

/// Records every notification into a [`HandlerLog`], and optionally refuses
/// connect requests
pub struct RecordingHandler {
    log: HandlerLog,
    refuse_with: Option<String>,
}

impl RecordingHandler {
    pub fn new(log: HandlerLog) -> Self {
        Self {
            log,
            refuse_with: None,
        }
    }

    pub fn refusing(log: HandlerLog, reason: &str) -> Self {
        Self {
            log,
            refuse_with: Some(reason.to_string()),
        }
    }
}

impl ConnectionHandler for RecordingHandler {
    fn read_connect_request(&mut self, _reader: &mut BitReader) -> Result<(), String> {
        match &self.refuse_with {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn on_connection_established(&mut self, is_initiator: bool) {
        self.log.push(HandlerCall::Established { is_initiator });
    }

    fn on_connection_rejected(&mut self, reason: &str) {
        self.log.push(HandlerCall::Rejected {
            reason: reason.to_string(),
        });
    }

    fn on_connect_timed_out(&mut self) {
        self.log.push(HandlerCall::ConnectTimedOut);
    }

    fn on_timed_out(&mut self) {
        self.log.push(HandlerCall::TimedOut);
    }

    fn on_disconnect(&mut self, reason: &str) {
        self.log.push(HandlerCall::Disconnected {
            reason: reason.to_string(),
        });
    }

    fn handle_startup_error(&mut self, error: &str) {
        self.log.push(HandlerCall::StartupError {
            error: error.to_string(),
        });
    }

    fn connection_error(&mut self, error: &str) {
        self.log.push(HandlerCall::ConnectionError {
            error: error.to_string(),
        });
    }

    fn on_event_lost(&mut self, event: &dyn NetEvent) {
        let value = event
            .as_any()
            .downcast_ref::<Numbered>()
            .map(|numbered| numbered.value);
        self.log.push(HandlerCall::EventLost { value });
    }

    fn on_ghost_always_started(&mut self, count: u32) {
        self.log.push(HandlerCall::GhostAlwaysStarted { count });
    }

    fn on_ghost_always_objects_received(&mut self) {
        self.log.push(HandlerCall::GhostAlwaysObjectsReceived);
    }

    fn on_ready_for_normal_ghosts(&mut self) {
        self.log.push(HandlerCall::ReadyForNormalGhosts);
    }

    fn on_file_chunk_received(&mut self, name: &str, received: usize, size: usize) {
        self.log.push(HandlerCall::FileChunkReceived {
            name: name.to_string(),
            received,
            size,
        });
    }

    fn demo_playback_complete(&mut self) {
        self.log.push(HandlerCall::DemoPlaybackComplete);
    }
}
