use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::Path,
};

use ghostnet_serde::{BitReader, BitWrite, Serde, SerdeErr, StreamWriter};
use log::{info, warn};

use crate::{
    connection::{
        error::DemoError, net_connection::NetConnection, packet_notify::PacketNotify,
    },
    constants::{ACK_HISTORY_SIZE, DEMO_MAX_BLOCK_SIZE, DEMO_MAX_BLOCK_TYPES},
    game_time::GameInstant,
    ghosts::{ghost_receiver::GhostReceiver, object_registry::ObjectRegistry},
    pack_context::{PackContext, UnpackContext},
    strings::string_table::StringTable,
};

/// Kinds of block in a demo stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoBlockType {
    /// A raw packet as it was received
    Packet = 0,
    /// The pacing check allowed a Data packet to be sent
    SendPacket = 1,
}

impl DemoBlockType {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(DemoBlockType::Packet),
            1 => Some(DemoBlockType::SendPacket),
            _ => None,
        }
    }
}

/// Packs a block header: 4 bits of type, 12 bits of size
fn block_header(block_type: u16, size: usize) -> u16 {
    (block_type << 12) | (size as u16 & 0x0FFF)
}

pub(crate) struct DemoRecorder {
    stream: Box<dyn Write>,
}

pub(crate) struct DemoPlayer {
    stream: Box<dyn Read>,
    next_block: Option<(u16, usize)>,
}

impl DemoPlayer {
    /// Reads the next block header; None at a clean end of stream
    fn read_block_header(&mut self) -> Result<Option<(u16, usize)>, DemoError> {
        let mut bytes = [0u8; 2];
        match self.stream.read_exact(&mut bytes) {
            Ok(()) => {
                let header = u16::from_le_bytes(bytes);
                Ok(Some((header >> 12, (header & 0x0FFF) as usize)))
            }
            Err(error) if error.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

fn read_u32(stream: &mut dyn Read) -> Result<u32, DemoError> {
    let mut bytes = [0u8; 4];
    stream.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

impl NetConnection {
    // Recording

    pub fn is_recording(&self) -> bool {
        self.demo_recorder.is_some()
    }

    /// Starts recording this connection into `stream`: a header with the
    /// protocol version and a snapshot of the connection, then one block per
    /// received packet and per send decision
    pub fn start_demo_record(&mut self, mut stream: Box<dyn Write>) -> Result<(), DemoError> {
        if self.demo_recorder.is_some() {
            return Err(DemoError::AlreadyRecording);
        }

        let mut start_block = StreamWriter::new();
        self.write_demo_start_block(&mut start_block);
        let start_block = start_block.to_bytes();

        stream.write_all(&self.protocol.protocol_version.to_le_bytes())?;
        stream.write_all(&(start_block.len() as u32).to_le_bytes())?;
        stream.write_all(&start_block)?;

        self.demo_recorder = Some(DemoRecorder { stream });
        info!("NetConnection: demo recording started");
        Ok(())
    }

    pub fn start_demo_record_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), DemoError> {
        let file = File::create(path)?;
        self.start_demo_record(Box::new(BufWriter::new(file)))
    }

    pub fn stop_recording(&mut self) {
        if let Some(mut recorder) = self.demo_recorder.take() {
            if let Err(error) = recorder.stream.flush() {
                warn!("NetConnection: could not flush demo: {}", error);
            }
            info!("NetConnection: demo recording stopped");
        }
    }

    pub(super) fn record_block(&mut self, block_type: DemoBlockType, data: &[u8]) {
        let Some(recorder) = self.demo_recorder.as_mut() else {
            return;
        };
        if data.len() >= DEMO_MAX_BLOCK_SIZE {
            let error = DemoError::BlockTooLarge {
                size: data.len(),
                max: DEMO_MAX_BLOCK_SIZE - 1,
            };
            warn!("NetConnection: block not recorded: {}", error);
            return;
        }

        let header = block_header(block_type as u16, data.len());
        let result = recorder
            .stream
            .write_all(&header.to_le_bytes())
            .and_then(|_| recorder.stream.write_all(data));
        if let Err(error) = result {
            warn!("NetConnection: demo write failed, recording stopped: {}", error);
            self.demo_recorder = None;
        }
    }

    fn write_demo_start_block(&self, writer: &mut dyn BitWrite) {
        self.connection_protocol.write_demo_start_block(writer);
        self.round_trip_time.ser(writer);
        self.packet_loss.ser(writer);

        writer.write_bit(self.strings.is_some());
        if let Some(strings) = self.strings.as_ref() {
            strings.write_demo_start_block(writer);
        }

        (self.notifies.len() as u32).ser(writer);

        let objects = ObjectRegistry::new();
        let context = PackContext {
            protocol: &self.protocol,
            objects: &objects,
            strings: self.strings.as_ref(),
            host_type: self.host_type,
        };
        self.events.write_demo_start_block(writer, &context);

        writer.write_bit(self.ghost_to.is_some());
        if let Some(ghost_to) = self.ghost_to.as_ref() {
            ghost_to.write_demo_start_block(writer, &context);
        }
    }

    // Playback

    pub fn is_playing_back(&self) -> bool {
        self.demo_player.is_some()
    }

    /// Restores the recorded snapshot and prepares to replay the blocks that
    /// follow it. Nothing is transmitted while replaying.
    pub fn replay_demo_record(&mut self, mut stream: Box<dyn Read>) -> Result<(), DemoError> {
        let version = read_u32(stream.as_mut())?;
        if version != self.protocol.protocol_version {
            return Err(DemoError::ProtocolVersionMismatch {
                expected: self.protocol.protocol_version,
                found: version,
            });
        }

        let size = read_u32(stream.as_mut())? as usize;
        let mut start_block = Vec::new();
        stream
            .as_mut()
            .take(size as u64)
            .read_to_end(&mut start_block)?;
        if start_block.len() != size {
            return Err(DemoError::InvalidStartBlock);
        }
        self.read_demo_start_block(&mut BitReader::new(&start_block))
            .map_err(|_| DemoError::InvalidStartBlock)?;

        let mut player = DemoPlayer {
            stream,
            next_block: None,
        };
        player.next_block = player.read_block_header()?;
        self.demo_player = Some(player);
        info!("NetConnection: demo playback started");
        Ok(())
    }

    pub fn replay_demo_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), DemoError> {
        let file = File::open(path)?;
        self.replay_demo_record(Box::new(BufReader::new(file)))
    }

    /// Replays one recorded block. Returns false once playback is complete.
    pub fn process_next_demo_block(&mut self, now: GameInstant) -> Result<bool, DemoError> {
        let Some(player) = self.demo_player.as_mut() else {
            return Err(DemoError::NotPlaying);
        };
        let Some((block_type, size)) = player.next_block else {
            self.stop_demo_playback();
            return Ok(false);
        };

        if block_type >= DEMO_MAX_BLOCK_TYPES {
            return Err(DemoError::UnknownBlockType { block_type });
        }
        let mut data = vec![0u8; size];
        if let Err(error) = player.stream.read_exact(&mut data) {
            warn!("NetConnection: demo ends inside a block: {}", error);
            self.stop_demo_playback();
            return Ok(false);
        }
        player.next_block = player.read_block_header()?;

        match DemoBlockType::from_u16(block_type) {
            Some(DemoBlockType::Packet) => self.process_raw_packet(now, &data),
            Some(DemoBlockType::SendPacket) => {
                let objects = ObjectRegistry::new();
                self.check_packet_send(now, &objects, true);
            }
            None => return Err(DemoError::UnknownBlockType { block_type }),
        }

        let finished = self
            .demo_player
            .as_ref()
            .map(|player| player.next_block.is_none())
            .unwrap_or(true);
        if finished {
            self.stop_demo_playback();
            return Ok(false);
        }
        Ok(true)
    }

    fn stop_demo_playback(&mut self) {
        if self.demo_player.take().is_some() {
            info!("NetConnection: demo playback complete");
            self.handler.demo_playback_complete();
        }
    }

    fn read_demo_start_block(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr> {
        self.connection_protocol.read_demo_start_block(reader)?;
        self.round_trip_time = f32::de(reader)?;
        self.packet_loss = f32::de(reader)?;

        if reader.read_bit()? {
            let mut strings = StringTable::new();
            strings.read_demo_start_block(reader)?;
            self.strings = Some(strings);
        }

        let notify_count = u32::de(reader)?;
        // SECURITY: a connection never has more packets in flight than it can ack
        if notify_count as usize > ACK_HISTORY_SIZE {
            return Err(SerdeErr);
        }
        for _ in 0..notify_count {
            self.notifies.push(PacketNotify::new(GameInstant::default()));
        }

        let context = UnpackContext {
            protocol: &self.protocol,
            strings: self.strings.as_ref(),
            host_type: self.host_type,
        };
        self.events.read_demo_start_block(reader, &context)?;

        if reader.read_bit()? {
            let mut ghost_to = GhostReceiver::new();
            ghost_to.read_demo_start_block(reader, &context)?;
            self.ghost_to = Some(ghost_to);
        }
        Ok(())
    }
}
