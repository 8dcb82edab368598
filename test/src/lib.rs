pub mod helpers;
pub mod local_socket;
pub mod test_protocol;

pub use helpers::*;
pub use local_socket::{LinkControl, LocalSocketPair, CLIENT_ADDR, SERVER_ADDR};
pub use test_protocol::{protocol, protocol_in_group, ChatMessage, Level, Numbered, Position, TestPlugin};
