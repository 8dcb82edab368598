use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};
use log::trace;

use crate::{
    connection::packet_type::PacketType,
    constants::{ACK_HISTORY_SIZE, PACKET_RECEIVE_WINDOW, PACKET_SEQUENCE_BIT_SIZE, PACKET_SEQUENCE_MASK},
    types::PacketSequence,
};

/// Unacknowledged Data packets allowed in flight
pub const PACKET_WINDOW_SIZE: u32 = 30;

/// Result of accepting a packet header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedHeader {
    pub packet_type: PacketType,
    pub sequence: PacketSequence,
    /// One entry per newly resolved sent packet, oldest first: acknowledged
    /// or lost
    pub notifies: Vec<bool>,
    /// A Data packet not seen before; its body should be processed
    pub is_new_data: bool,
}

/// Sequence numbers and acknowledgements of a connection.
///
/// Every packet carries its 9-bit send sequence, the highest sequence
/// received from the peer, and a mask of which of the preceding packets
/// arrived. Each side infers from these, in send order, which of its Data
/// packets were delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionProtocol {
    last_seq_recvd_at_send: [PacketSequence; ACK_HISTORY_SIZE],
    last_seq_recvd: PacketSequence,
    highest_acked_seq: PacketSequence,
    last_send_seq: PacketSequence,
    ack_mask: u32,
    connect_sequence: u32,
    last_recv_ack_ack: PacketSequence,
    connection_established: bool,
}

impl ConnectionProtocol {
    pub fn new() -> Self {
        Self {
            last_seq_recvd_at_send: [0; ACK_HISTORY_SIZE],
            last_seq_recvd: 0,
            highest_acked_seq: 0,
            last_send_seq: 0,
            ack_mask: 0,
            connect_sequence: 0,
            last_recv_ack_ack: 0,
            connection_established: false,
        }
    }

    pub fn set_connect_sequence(&mut self, connect_sequence: u32) {
        self.connect_sequence = connect_sequence;
    }

    pub fn connect_sequence(&self) -> u32 {
        self.connect_sequence
    }

    pub fn last_send_seq(&self) -> PacketSequence {
        self.last_send_seq
    }

    pub fn last_seq_recvd(&self) -> PacketSequence {
        self.last_seq_recvd
    }

    pub fn highest_acked_seq(&self) -> PacketSequence {
        self.highest_acked_seq
    }

    /// Whether any packet from the peer has been accepted yet
    pub fn has_received(&self) -> bool {
        self.connection_established
    }

    pub fn window_full(&self) -> bool {
        self.last_send_seq.wrapping_sub(self.highest_acked_seq) >= PACKET_WINDOW_SIZE
    }

    /// Writes a header; Data packets consume a send sequence
    pub fn write_header(&mut self, writer: &mut dyn BitWrite, packet_type: PacketType) {
        let ack_byte_count = ((self.last_seq_recvd.wrapping_sub(self.last_recv_ack_ack) + 7) >> 3).min(4);

        if packet_type == PacketType::Data {
            self.last_send_seq = self.last_send_seq.wrapping_add(1);
            self.last_seq_recvd_at_send[self.last_send_seq as usize % ACK_HISTORY_SIZE] = self.last_seq_recvd;
        }

        // marks a connected (game) packet
        writer.write_bit(true);
        writer.write_bit(self.connect_sequence & 1 != 0);
        write_bits(writer, self.last_send_seq, PACKET_SEQUENCE_BIT_SIZE);
        write_bits(writer, self.last_seq_recvd, PACKET_SEQUENCE_BIT_SIZE);
        packet_type.ser(writer);
        write_bits(writer, ack_byte_count, 3);
        write_bits(writer, self.ack_mask, (ack_byte_count * 8) as u8);
    }

    /// Accepts or discards a header. `Ok(None)` means the packet is stale,
    /// duplicated or from another connection attempt and must be ignored.
    pub fn read_header(&mut self, reader: &mut BitReader) -> Result<Option<ReceivedHeader>, SerdeErr> {
        // game packet flag, checked by the interface
        reader.read_bit()?;
        let connect_parity = reader.read_bit()?;
        let mut sequence = read_bits(reader, PACKET_SEQUENCE_BIT_SIZE)?;
        let mut highest_ack = read_bits(reader, PACKET_SEQUENCE_BIT_SIZE)?;
        let packet_type = PacketType::de(reader)?;
        let ack_byte_count = read_bits(reader, 3)?;

        if connect_parity != (self.connect_sequence & 1 != 0) {
            trace!("ConnectionProtocol: dropping packet from another connect sequence");
            return Ok(None);
        }
        if ack_byte_count > 4 {
            return Err(SerdeErr);
        }
        let ack_mask = read_bits(reader, (ack_byte_count * 8) as u8)?;

        sequence = expand_sequence(sequence, self.last_seq_recvd);
        if sequence.wrapping_sub(self.last_seq_recvd) > PACKET_RECEIVE_WINDOW {
            trace!("ConnectionProtocol: dropping out of window packet {}", sequence);
            return Ok(None);
        }

        highest_ack = expand_sequence(highest_ack, self.highest_acked_seq);
        if highest_ack.wrapping_sub(self.last_send_seq) as i32 > 0 {
            trace!("ConnectionProtocol: dropping packet acking unsent sequence {}", highest_ack);
            return Ok(None);
        }

        let delta = sequence.wrapping_sub(self.last_seq_recvd);
        self.ack_mask = if delta >= 32 { 0 } else { self.ack_mask << delta };
        if packet_type == PacketType::Data {
            self.ack_mask |= 1;
        }

        let mut notifies = Vec::new();
        let mut acked = self.highest_acked_seq.wrapping_add(1);
        while highest_ack.wrapping_sub(acked) as i32 >= 0 {
            let distance = highest_ack.wrapping_sub(acked);
            let received = distance < 32 && ack_mask & (1 << distance) != 0;
            if received {
                self.last_recv_ack_ack = self.last_seq_recvd_at_send[acked as usize % ACK_HISTORY_SIZE];
            }
            notifies.push(received);
            acked = acked.wrapping_add(1);
        }

        if sequence.wrapping_sub(self.last_recv_ack_ack) > 32 {
            self.last_recv_ack_ack = sequence.wrapping_sub(32);
        }
        self.highest_acked_seq = highest_ack;
        self.connection_established = true;

        let is_new_data = self.last_seq_recvd != sequence && packet_type == PacketType::Data;
        self.last_seq_recvd = sequence;

        Ok(Some(ReceivedHeader {
            packet_type,
            sequence,
            notifies,
            is_new_data,
        }))
    }

    // Demo

    pub fn write_demo_start_block(&self, writer: &mut dyn BitWrite) {
        for sequence in &self.last_seq_recvd_at_send {
            sequence.ser(writer);
        }
        self.last_seq_recvd.ser(writer);
        self.highest_acked_seq.ser(writer);
        self.last_send_seq.ser(writer);
        self.ack_mask.ser(writer);
        self.connect_sequence.ser(writer);
        self.last_recv_ack_ack.ser(writer);
        self.connection_established.ser(writer);
    }

    pub fn read_demo_start_block(&mut self, reader: &mut BitReader) -> Result<(), SerdeErr> {
        for sequence in self.last_seq_recvd_at_send.iter_mut() {
            *sequence = PacketSequence::de(reader)?;
        }
        self.last_seq_recvd = PacketSequence::de(reader)?;
        self.highest_acked_seq = PacketSequence::de(reader)?;
        self.last_send_seq = PacketSequence::de(reader)?;
        self.ack_mask = u32::de(reader)?;
        self.connect_sequence = u32::de(reader)?;
        self.last_recv_ack_ack = PacketSequence::de(reader)?;
        self.connection_established = bool::de(reader)?;
        Ok(())
    }
}

impl Default for ConnectionProtocol {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuilds a full sequence from its low 9 bits, choosing the value at or
/// just after `reference`
pub fn expand_sequence(low_bits: u32, reference: PacketSequence) -> PacketSequence {
    let mut sequence = low_bits | (reference & !PACKET_SEQUENCE_MASK);
    if sequence < reference {
        sequence = sequence.wrapping_add(PACKET_SEQUENCE_MASK + 1);
    }
    sequence
}
