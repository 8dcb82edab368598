use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, SerdeErr};

use crate::{
    constants::STRING_ENTRY_BIT_SIZE,
    ghosts::object_registry::ObjectRegistry,
    strings::{
        string_codec::{pack_string, unpack_string},
        string_table::StringTable,
    },
    types::HostType,
    Protocol,
};

/// Everything an event or object may consult while packing itself
pub struct PackContext<'a> {
    pub protocol: &'a Protocol,
    pub objects: &'a ObjectRegistry,
    pub strings: Option<&'a StringTable>,
    pub host_type: HostType,
}

impl<'a> PackContext<'a> {
    /// Writes a possibly absent string, sending only its table index when
    /// the peer already knows it.
    ///
    /// Layout: valid flag, then a table flag followed by either a 10-bit
    /// index or the packed string.
    pub fn pack_net_string(&self, writer: &mut dyn BitWrite, string: Option<&str>) {
        let Some(string) = string else {
            writer.write_bit(false);
            return;
        };
        writer.write_bit(true);

        let index = self
            .strings
            .and_then(|strings| strings.confirmed_index(string));
        match index {
            Some(index) => {
                writer.write_bit(true);
                write_bits(writer, u32::from(index), STRING_ENTRY_BIT_SIZE);
            }
            None => {
                writer.write_bit(false);
                pack_string(writer, string);
            }
        }
    }
}

/// Everything an event or object may consult while unpacking itself
pub struct UnpackContext<'a> {
    pub protocol: &'a Protocol,
    pub strings: Option<&'a StringTable>,
    pub host_type: HostType,
}

impl<'a> UnpackContext<'a> {
    pub fn unpack_net_string(&self, reader: &mut BitReader) -> Result<Option<String>, SerdeErr> {
        if !reader.read_bit()? {
            return Ok(None);
        }
        if reader.read_bit()? {
            let index = read_bits(reader, STRING_ENTRY_BIT_SIZE)? as u16;
            let strings = self.strings.ok_or(SerdeErr)?;
            let string = strings.lookup_string(index).ok_or(SerdeErr)?;
            return Ok(Some(string.to_string()));
        }
        unpack_string(reader).map(Some)
    }
}
