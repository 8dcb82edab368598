/// Largest datagram payload the connection layer will ever produce or accept
pub const MAX_PACKET_DATA_SIZE: usize = 1500;
pub const MAX_PACKET_DATA_SIZE_BITS: u32 = (MAX_PACKET_DATA_SIZE as u32) * 8;
