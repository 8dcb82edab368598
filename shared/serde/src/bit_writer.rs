use crate::constants::MAX_PACKET_DATA_SIZE;

pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
    fn count_bits(&mut self, bits: u32);
    fn is_counter(&self) -> bool;
}

/// Writes bits into a byte buffer limited to a budget of `max_bytes`.
///
/// Writing past the budget never panics: the bits are still stored but the
/// writer reports `is_overflowed()`, which callers use to throw the packet
/// away (or to avoid getting there in the first place, with `bits_free()`).
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    current_bits: u32,
    max_bits: u32,
    reserved_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_max_bytes(MAX_PACKET_DATA_SIZE)
    }

    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(max_bytes),
            current_bits: 0,
            max_bits: (max_bytes as u32) * 8,
            reserved_bits: 0,
        }
    }

    fn finalize(&mut self) {
        if self.scratch_index > 0 {
            self.buffer
                .push((self.scratch << (8 - self.scratch_index)).reverse_bits());
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    pub fn to_bytes(mut self) -> Vec<u8> {
        self.finalize();
        self.buffer
    }

    /// Returns a counter starting at the current write position, sharing this
    /// writer's budget
    pub fn counter(&self) -> BitCounter {
        BitCounter::new(self.current_bits, self.current_bits, self.budget())
    }

    /// Holds back `bits` from the budget, so that terminators written later
    /// are guaranteed to fit
    pub fn reserve_bits(&mut self, bits: u32) {
        self.reserved_bits += bits;
    }

    pub fn release_bits(&mut self, bits: u32) {
        self.reserved_bits = self.reserved_bits.saturating_sub(bits);
    }

    pub fn bits_written(&self) -> u32 {
        self.current_bits
    }

    pub fn bits_free(&self) -> u32 {
        self.budget().saturating_sub(self.current_bits)
    }

    pub fn is_overflowed(&self) -> bool {
        self.current_bits > self.max_bits
    }

    fn budget(&self) -> u32 {
        self.max_bits.saturating_sub(self.reserved_bits)
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.current_bits += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index -= 8;
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

    fn count_bits(&mut self, _: u32) {
        // a real writer has nothing to count
    }

    fn is_counter(&self) -> bool {
        false
    }
}

/// A `BitWrite` that only tallies how many bits would have been written
pub struct BitCounter {
    start_bits: u32,
    current_bits: u32,
    max_bits: u32,
}

impl BitCounter {
    pub fn new(start_bits: u32, current_bits: u32, max_bits: u32) -> Self {
        Self {
            start_bits,
            current_bits,
            max_bits,
        }
    }

    pub fn overflowed(&self) -> bool {
        self.current_bits > self.max_bits
    }

    pub fn bits_needed(&self) -> u32 {
        self.current_bits - self.start_bits
    }
}

impl BitWrite for BitCounter {
    fn write_bit(&mut self, _: bool) {
        self.current_bits += 1;
    }
    fn write_byte(&mut self, _: u8) {
        self.current_bits += 8;
    }
    fn count_bits(&mut self, bits: u32) {
        self.current_bits += bits;
    }
    fn is_counter(&self) -> bool {
        true
    }
}
