pub mod error;
pub mod ghost_info;
pub mod ghost_manager;
pub mod ghost_receiver;
pub mod object_kinds;
pub mod object_registry;
pub mod replicable;
pub mod scope;
