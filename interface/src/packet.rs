use ghostnet_shared::{BitReader, BitWrite, Serde, SerdeErr};

/// Types of the unconnected packets that set up and tear down connections.
///
/// Each one is written as the first byte of a datagram. The values are even,
/// so a first byte with the low bit set always marks a packet that belongs to
/// an established connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OobPacketType {
    ConnectChallengeRequest = 0,
    ConnectChallengeReject = 2,
    ConnectChallengeResponse = 4,
    ConnectRequest = 6,
    ConnectReject = 8,
    ConnectAccept = 10,
    Disconnect = 12,
}

impl OobPacketType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::ConnectChallengeRequest),
            2 => Some(Self::ConnectChallengeReject),
            4 => Some(Self::ConnectChallengeResponse),
            6 => Some(Self::ConnectRequest),
            8 => Some(Self::ConnectReject),
            10 => Some(Self::ConnectAccept),
            12 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// True if the datagram belongs to an established connection
pub fn is_connected_packet(packet: &[u8]) -> bool {
    packet.first().is_some_and(|byte| byte & 1 == 1)
}

/// Every unconnected packet starts with its type and the connect sequence
/// of the attempt it belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OobHeader {
    pub packet_type: OobPacketType,
    pub connect_sequence: u32,
}

impl OobHeader {
    pub fn new(packet_type: OobPacketType, connect_sequence: u32) -> Self {
        Self {
            packet_type,
            connect_sequence,
        }
    }
}

impl Serde for OobHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_byte(self.packet_type as u8);
        self.connect_sequence.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let packet_type = OobPacketType::from_byte(reader.read_byte()?).ok_or(SerdeErr)?;
        let connect_sequence = u32::de(reader)?;
        Ok(Self {
            packet_type,
            connect_sequence,
        })
    }

    fn bit_length(&self) -> u32 {
        8 + self.connect_sequence.bit_length()
    }
}
