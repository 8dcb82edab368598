use std::any::Any;

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    constants::{CONNECTION_MESSAGE_BIT_SIZE, GHOST_COUNT_BIT_SIZE},
    events::net_event::{NetEvent, NetEventRead},
    pack_context::{PackContext, UnpackContext},
};

/// Control messages the two ends of a connection exchange about ghosting
/// and file downloads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionMessage {
    SendNextDownloadRequest = 1,
    FileDownloadSize = 2,
    GhostAlwaysDone = 3,
    ReadyForNormalGhosts = 4,
    EndGhosting = 5,
    GhostAlwaysStarting = 6,
}

impl ConnectionMessage {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ConnectionMessage::SendNextDownloadRequest),
            2 => Some(ConnectionMessage::FileDownloadSize),
            3 => Some(ConnectionMessage::GhostAlwaysDone),
            4 => Some(ConnectionMessage::ReadyForNormalGhosts),
            5 => Some(ConnectionMessage::EndGhosting),
            6 => Some(ConnectionMessage::GhostAlwaysStarting),
            _ => None,
        }
    }

    /// Messages only a client (the ghost receiver) may be sent
    pub fn requires_ghost_receiver(&self) -> bool {
        matches!(
            self,
            ConnectionMessage::SendNextDownloadRequest
                | ConnectionMessage::FileDownloadSize
                | ConnectionMessage::GhostAlwaysStarting
                | ConnectionMessage::GhostAlwaysDone
                | ConnectionMessage::EndGhosting
        )
    }
}

/// Carries a [`ConnectionMessage`] with its ghosting sequence and a count
/// (a ghost count, or a file size in bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionMessageEvent {
    pub sequence: u32,
    pub message: ConnectionMessage,
    pub ghost_count: u32,
}

impl ConnectionMessageEvent {
    pub fn new(message: ConnectionMessage, sequence: u32, ghost_count: u32) -> Self {
        Self {
            sequence,
            message,
            ghost_count,
        }
    }
}

impl NetEvent for ConnectionMessageEvent {
    fn pack(&self, _context: &PackContext, writer: &mut dyn BitWrite) {
        self.sequence.ser(writer);
        write_bits(writer, self.message as u32, CONNECTION_MESSAGE_BIT_SIZE);
        if self.message == ConnectionMessage::FileDownloadSize {
            self.ghost_count.ser(writer);
        } else {
            write_bits(writer, self.ghost_count, GHOST_COUNT_BIT_SIZE);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for ConnectionMessageEvent {
    fn unpack(_context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let sequence = u32::de(reader)?;
        let code = read_bits(reader, CONNECTION_MESSAGE_BIT_SIZE)?;
        let message = ConnectionMessage::from_code(code).ok_or(SerdeErr)?;
        let ghost_count = if message == ConnectionMessage::FileDownloadSize {
            u32::de(reader)?
        } else {
            read_bits(reader, GHOST_COUNT_BIT_SIZE)?
        };
        Ok(Self {
            sequence,
            message,
            ghost_count,
        })
    }
}
