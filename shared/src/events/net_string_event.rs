use std::any::Any;

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    constants::STRING_ENTRY_BIT_SIZE,
    events::net_event::{NetEvent, NetEventRead},
    pack_context::{PackContext, UnpackContext},
};

/// Announces a string table entry to the peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetStringEvent {
    pub index: u16,
    pub string: String,
}

impl NetStringEvent {
    pub fn new(index: u16, string: String) -> Self {
        Self { index, string }
    }
}

impl NetEvent for NetStringEvent {
    fn pack(&self, _context: &PackContext, writer: &mut dyn BitWrite) {
        write_bits(writer, u32::from(self.index), STRING_ENTRY_BIT_SIZE);
        self.string.ser(writer);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for NetStringEvent {
    fn unpack(_context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let index = read_bits(reader, STRING_ENTRY_BIT_SIZE)? as u16;
        let string = String::de(reader)?;
        Ok(Self { index, string })
    }
}
