pub mod connection_message;
pub mod error;
pub mod event_kinds;
pub mod event_manager;
pub mod file_events;
pub mod ghost_always_event;
pub mod net_event;
pub mod net_string_event;
