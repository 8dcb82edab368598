pub mod connection_config;
pub mod connection_protocol;
pub mod demo;
pub mod error;
pub mod ghosting;
pub mod handler;
pub mod link_conditioner;
pub mod net_connection;
pub mod packet_notify;
pub mod packet_type;
pub mod rate;
