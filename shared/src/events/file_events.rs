use std::any::Any;

use ghostnet_serde::{bits_required, read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    constants::{FILE_CHUNK_SIZE, MAX_FILE_NAMES},
    events::net_event::{EventDirection, NetEvent, NetEventRead},
    pack_context::{PackContext, UnpackContext},
};

fn name_count_bits() -> u8 {
    bits_required(MAX_FILE_NAMES as u32 + 1)
}

fn chunk_length_bits() -> u8 {
    bits_required(FILE_CHUNK_SIZE as u32 + 1)
}

/// Client asks the server for the files it is missing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDownloadRequestEvent {
    pub names: Vec<String>,
}

impl FileDownloadRequestEvent {
    /// Keeps at most the first 31 names
    pub fn new(mut names: Vec<String>) -> Self {
        names.truncate(MAX_FILE_NAMES);
        Self { names }
    }
}

impl NetEvent for FileDownloadRequestEvent {
    fn direction(&self) -> EventDirection {
        EventDirection::ClientToServer
    }

    fn pack(&self, _context: &PackContext, writer: &mut dyn BitWrite) {
        let count = self.names.len().min(MAX_FILE_NAMES);
        write_bits(writer, count as u32, name_count_bits());
        for name in self.names.iter().take(count) {
            name.ser(writer);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for FileDownloadRequestEvent {
    fn unpack(_context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let count = read_bits(reader, name_count_bits())? as usize;
        if count > MAX_FILE_NAMES {
            return Err(SerdeErr);
        }
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            names.push(String::de(reader)?);
        }
        Ok(Self { names })
    }
}

/// Up to 63 bytes of the file currently being sent. An empty chunk means
/// the requested file is not available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChunkEvent {
    pub data: Vec<u8>,
}

impl FileChunkEvent {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl NetEvent for FileChunkEvent {
    fn direction(&self) -> EventDirection {
        EventDirection::ServerToClient
    }

    fn pack(&self, _context: &PackContext, writer: &mut dyn BitWrite) {
        let length = self.data.len().min(FILE_CHUNK_SIZE);
        write_bits(writer, length as u32, chunk_length_bits());
        for byte in &self.data[..length] {
            writer.write_byte(*byte);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl NetEventRead for FileChunkEvent {
    fn unpack(_context: &UnpackContext, reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = read_bits(reader, chunk_length_bits())? as usize;
        let mut data = Vec::with_capacity(length);
        for _ in 0..length {
            data.push(reader.read_byte()?);
        }
        Ok(Self { data })
    }
}
