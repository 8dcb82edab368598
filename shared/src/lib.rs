//! # Ghostnet Shared
//! The connection core of ghostnet: packet acknowledgement and rate control,
//! reliable events, object ghosting, string tables, file transfer and demo
//! recording.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

pub use ghostnet_serde::{
    bits_required, read_bits, write_bits, BitCounter, BitReader, BitWrite, BitWriter,
    ConstBitLength, Serde, SerdeErr, SerdeIntegerConversion, SignedInteger,
    SignedVariableInteger, StreamWriter, UnsignedInteger, UnsignedVariableInteger,
    MAX_PACKET_DATA_SIZE, MAX_PACKET_DATA_SIZE_BITS,
};

mod connection;
mod constants;
mod events;
mod files;
mod game_time;
mod ghosts;
mod pack_context;
mod protocol;
mod sequence_list;
mod strings;
mod types;
mod wrapping_number;

pub use connection::{
    connection_config::ConnectionConfig,
    connection_protocol::{expand_sequence, ConnectionProtocol, ReceivedHeader, PACKET_WINDOW_SIZE},
    demo::DemoBlockType,
    error::{ConnectionError, DemoError},
    handler::{ConnectionHandler, NoopHandler},
    link_conditioner::{LinkConditioner, LinkConditionerConfig},
    net_connection::{NetConnection, INVALID_CLASS_REASON},
    packet_notify::{PacketNotify, PacketNotifyQueue},
    packet_type::PacketType,
    rate::{NetRate, RateControl, RatePrefs},
};
pub use constants::*;
pub use events::{
    connection_message::{ConnectionMessage, ConnectionMessageEvent},
    error::EventError,
    event_kinds::EventKinds,
    event_manager::{EventManager, EventReadOutcome},
    file_events::{FileChunkEvent, FileDownloadRequestEvent},
    ghost_always_event::GhostAlwaysObjectEvent,
    net_event::{
        downcast_event, event_is, EventDirection, EventNote, Guarantee, NetEvent, NetEventRead,
    },
    net_string_event::NetStringEvent,
};
pub use files::{
    error::FileTransferError,
    file_store::{DirectoryFileStore, FileStore, MemoryFileStore},
    file_transfer::{ChunkOutcome, FileTransfer, UploadStart},
};
pub use game_time::{GameClock, GameInstant};
pub use ghosts::{
    error::GhostError,
    ghost_info::{GhostFlags, GhostInfo, GhostRef},
    ghost_manager::{GhostManager, GHOST_SECTION_RESERVED_BITS},
    ghost_receiver::{GhostEvent, GhostReceiver, SavedGhost},
    object_kinds::ObjectKinds,
    object_registry::{ObjectChange, ObjectFlags, ObjectId, ObjectRegistry},
    replicable::Replicable,
    scope::{GhostScope, ScopeEverything, ScopeQuery},
};
pub use pack_context::{PackContext, UnpackContext};
pub use protocol::{Protocol, ProtocolError, ProtocolPlugin};
pub use sequence_list::{SequenceError, SequenceList};
pub use strings::{
    string_codec::{classify_string, pack_string, unpack_string, StringCode},
    string_table::{StringLookup, StringTable},
};
pub use types::{ClassId, EventSequence, GhostIndex, HostType, PacketSequence};
pub use wrapping_number::{sequence_greater_than, sequence_less_than, wrapping_diff};
