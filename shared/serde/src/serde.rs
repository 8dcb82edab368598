use crate::{
    bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, UnsignedVariableInteger,
};

/// A type that can be written to and read back from a bit stream
pub trait Serde: Sized {
    fn ser(&self, writer: &mut dyn BitWrite);
    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr>;
    fn bit_length(&self) -> u32;
}

pub trait ConstBitLength {
    fn const_bit_length() -> u32;
}

/// Writes the low `bits` bits of `value`, least significant first
pub fn write_bits(writer: &mut dyn BitWrite, value: u32, bits: u8) {
    let mut value = value;
    for _ in 0..bits {
        writer.write_bit(value & 1 != 0);
        value >>= 1;
    }
}

pub fn read_bits(reader: &mut BitReader, bits: u8) -> Result<u32, SerdeErr> {
    let mut output: u32 = 0;
    for i in 0..bits {
        if reader.read_bit()? {
            output |= 1 << i;
        }
    }
    Ok(output)
}

/// Number of bits needed to address `count` distinct values, never less than 1
pub fn bits_required(count: u32) -> u8 {
    let mut bits = 1;
    while bits < 32 && (1_u64 << bits) < u64::from(count) {
        bits += 1;
    }
    bits
}

// bool

impl Serde for bool {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(*self);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        reader.read_bit()
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

impl ConstBitLength for bool {
    fn const_bit_length() -> u32 {
        1
    }
}

// unit

impl Serde for () {
    fn ser(&self, _: &mut dyn BitWrite) {}

    fn de(_: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(())
    }

    fn bit_length(&self) -> u32 {
        0
    }
}

// fixed width numbers

macro_rules! impl_serde_for_number {
    ($impl_type:ident, $bits:expr) => {
        impl Serde for $impl_type {
            fn ser(&self, writer: &mut dyn BitWrite) {
                for byte in self.to_le_bytes() {
                    writer.write_byte(byte);
                }
            }

            fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
                let mut bytes = [0_u8; $bits / 8];
                for byte in bytes.iter_mut() {
                    *byte = reader.read_byte()?;
                }
                Ok($impl_type::from_le_bytes(bytes))
            }

            fn bit_length(&self) -> u32 {
                $bits
            }
        }

        impl ConstBitLength for $impl_type {
            fn const_bit_length() -> u32 {
                $bits
            }
        }
    };
}

impl_serde_for_number!(u8, 8);
impl_serde_for_number!(u16, 16);
impl_serde_for_number!(u32, 32);
impl_serde_for_number!(u64, 64);
impl_serde_for_number!(i32, 32);
impl_serde_for_number!(f32, 32);

// String

impl Serde for String {
    fn ser(&self, writer: &mut dyn BitWrite) {
        let length = UnsignedVariableInteger::<5>::new(self.len() as u64);
        length.ser(writer);
        for byte in self.as_bytes() {
            writer.write_byte(*byte);
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let length = UnsignedVariableInteger::<5>::de(reader)?.get();
        if length < 0 || length as u64 > u64::from(reader.bits_remaining() / 8) {
            return Err(SerdeErr);
        }
        let mut bytes = Vec::with_capacity(length as usize);
        for _ in 0..length {
            bytes.push(reader.read_byte()?);
        }
        String::from_utf8(bytes).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        let length = UnsignedVariableInteger::<5>::new(self.len() as u64);
        length.bit_length() + (self.len() as u32) * 8
    }
}

// Option

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        match self {
            Some(value) => {
                writer.write_bit(true);
                value.ser(writer);
            }
            None => writer.write_bit(false),
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }

    fn bit_length(&self) -> u32 {
        match self {
            Some(value) => 1 + value.bit_length(),
            None => 1,
        }
    }
}
