use crate::BitWrite;

/// A growable `BitWrite` with no budget.
///
/// Used to assemble demo start blocks, and to stage an event or ghost update
/// so that its exact size is known before it is committed to a bounded
/// packet with `copy_into`.
#[derive(Clone, Default)]
pub struct StreamWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(64),
            bits_written: 0,
        }
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    pub fn is_empty(&self) -> bool {
        self.bits_written == 0
    }

    /// Replays every bit written so far into `writer`
    pub fn copy_into(&self, writer: &mut dyn BitWrite) {
        for byte in &self.buffer {
            writer.write_byte(*byte);
        }
        // pending bits sit in the low end of the scratch, oldest highest
        for i in (0..self.scratch_index).rev() {
            writer.write_bit((self.scratch >> i) & 1 != 0);
        }
    }

    pub fn to_bytes(mut self) -> Vec<u8> {
        if self.scratch_index > 0 {
            let byte = (self.scratch << (8 - self.scratch_index)).reverse_bits();
            self.buffer.push(byte);
        }
        self.buffer
    }
}

impl BitWrite for StreamWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index = 0;
            self.scratch = 0;
        }
    }

    fn write_byte(&mut self, byte: u8) {
        let mut temp = byte;
        for _ in 0..8 {
            self.write_bit(temp & 1 != 0);
            temp >>= 1;
        }
    }

    fn is_counter(&self) -> bool {
        false
    }

    fn count_bits(&mut self, _bits: u32) {}
}
