use ghostnet_serde::{BitReader, BitWrite};

use crate::events::net_event::NetEvent;

/// Application hooks of a [`NetConnection`](crate::NetConnection).
///
/// Every method has a default, so an implementation only overrides the
/// notifications it cares about.
pub trait ConnectionHandler {
    // Handshake

    /// Appends application data to the connect request
    fn write_connect_request(&mut self, _writer: &mut dyn BitWrite) {}

    /// Validates the application data of a connect request. An `Err` rejects
    /// the connection with that reason.
    fn read_connect_request(&mut self, _reader: &mut BitReader) -> Result<(), String> {
        Ok(())
    }

    /// Appends application data to the connect accept
    fn write_connect_accept(&mut self, _writer: &mut dyn BitWrite) {}

    fn read_connect_accept(&mut self, _reader: &mut BitReader) -> Result<(), String> {
        Ok(())
    }

    // Lifecycle

    fn on_connection_established(&mut self, _is_initiator: bool) {}

    fn on_connection_rejected(&mut self, _reason: &str) {}

    fn on_connect_timed_out(&mut self) {}

    fn on_timed_out(&mut self) {}

    fn on_disconnect(&mut self, _reason: &str) {}

    /// The accept could not be processed on the initiating side
    fn handle_startup_error(&mut self, _error: &str) {}

    /// A protocol error was found while reading a packet
    fn connection_error(&mut self, _error: &str) {}

    // Events

    /// An unguaranteed event went out in a packet that was lost. It is not
    /// sent again.
    fn on_event_lost(&mut self, _event: &dyn NetEvent) {}

    // Ghosting

    /// The server starts sending `count` scope-always objects
    fn on_ghost_always_started(&mut self, _count: u32) {}

    /// Every scope-always object has been installed
    fn on_ghost_always_objects_received(&mut self) {}

    /// The peer finished loading scope-always objects; normal ghosting runs
    fn on_ready_for_normal_ghosts(&mut self) {}

    fn on_file_chunk_received(&mut self, _name: &str, _received: usize, _size: usize) {}

    // Demo

    fn demo_playback_complete(&mut self) {}
}

/// A handler that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl ConnectionHandler for NoopHandler {}
