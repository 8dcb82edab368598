// The kind of a connected packet, carried in its header

use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum PacketType {
    // Advances the send sequence and carries rate, event and ghost data
    Data,
    // Asks the peer for an Ack; sent while waiting out a timeout
    Ping,
    // Carries only acknowledgements
    Ack,
}

impl Serde for PacketType {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let index = match self {
            PacketType::Data => 0,
            PacketType::Ping => 1,
            PacketType::Ack => 2,
        };
        write_bits(writer, index, 2);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        match read_bits(reader, 2)? {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::Ping),
            2 => Ok(PacketType::Ack),
            // SECURITY: 3 is unassigned; reject rather than guess
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        <Self as ConstBitLength>::const_bit_length()
    }
}

impl ConstBitLength for PacketType {
    fn const_bit_length() -> u32 {
        2
    }
}
