// Ghosts

/// Bits needed to address any ghost slot of a connection
pub const GHOST_ID_BIT_SIZE: u8 = 10;
pub const MAX_GHOST_COUNT: usize = 1 << GHOST_ID_BIT_SIZE;
/// Width of the "index size minus 3" field heading every ghost section
pub const GHOST_INDEX_BIT_SIZE: u8 = 4;
/// Ghost counts carried by connection messages may equal MAX_GHOST_COUNT
pub const GHOST_COUNT_BIT_SIZE: u8 = GHOST_ID_BIT_SIZE + 1;
pub const GHOST_KILL_PRIORITY: f32 = 10000.0;
pub const FULL_UPDATE_MASK: u32 = u32::MAX;

// Events

pub const EVENT_SEQUENCE_BIT_SIZE: u8 = 7;
pub const EVENT_SEQUENCE_MASK: u16 = (1 << EVENT_SEQUENCE_BIT_SIZE) - 1;
/// Ordered events more than this far past the last acked one are held back
pub const EVENT_SEND_WINDOW: u16 = 126;
pub const CONNECTION_MESSAGE_BIT_SIZE: u8 = 3;

// Packets

pub const PACKET_SEQUENCE_BIT_SIZE: u8 = 9;
pub const PACKET_SEQUENCE_MASK: u32 = (1 << PACKET_SEQUENCE_BIT_SIZE) - 1;
/// A received sequence further ahead than this is treated as out of order
pub const PACKET_RECEIVE_WINDOW: u32 = 31;
pub const ACK_HISTORY_SIZE: usize = 32;
pub const RATE_FIELD_BIT_SIZE: u8 = 12;

// String table

pub const STRING_ENTRY_BIT_SIZE: u8 = 10;
pub const STRING_TABLE_SIZE: usize = 1 << STRING_ENTRY_BIT_SIZE;
pub const STRING_TAG_PREFIX_BYTE: char = '\u{1}';

// File transfer

pub const FILE_CHUNK_SIZE: usize = 63;
pub const MAX_FILE_NAMES: usize = 31;
pub const FILE_CHUNKS_IN_FLIGHT: usize = 32;

// Demo recording

pub const DEMO_MAX_BLOCK_TYPES: u16 = 16;
pub const DEMO_MAX_BLOCK_SIZE: usize = 0x1000;
