/// Full (expanded) sequence number of a Data packet
pub type PacketSequence = u32;
/// Sequence number of an ordered event; wraps
pub type EventSequence = u16;
/// Slot of a ghost within one connection's ghost table
pub type GhostIndex = u16;
/// Wire identifier of a registered event or object kind
pub type ClassId = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }
}
