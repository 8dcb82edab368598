use crate::{
    bit_reader::BitReader, bit_writer::BitWrite, error::SerdeErr, serde::Serde, ConstBitLength,
};

pub trait SerdeIntegerConversion<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> {
    fn from(value: &SerdeInteger<SIGNED, VARIABLE, BITS>) -> Self;
}

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, false, BITS>;
pub type SignedInteger<const BITS: u8> = SerdeInteger<true, false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<false, true, BITS>;
pub type SignedVariableInteger<const BITS: u8> = SerdeInteger<true, true, BITS>;

// The generic wrapper only carries the layout; all the work happens in the
// non-generic inner type so each width does not get its own copy of the code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> {
    inner: IntegerLayout,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct IntegerLayout {
    value: i128,
    signed: bool,
    variable: bool,
    bits: u8,
}

impl IntegerLayout {
    fn check(signed: bool, variable: bool, bits: u8, value: i128) -> Result<Self, SerdeErr> {
        if bits == 0 || bits > 127 {
            return Err(SerdeErr);
        }
        if !signed && value < 0 {
            return Err(SerdeErr);
        }
        if !variable && value.unsigned_abs() >= 1_u128 << bits {
            return Err(SerdeErr);
        }
        Ok(Self {
            value,
            signed,
            variable,
            bits,
        })
    }

    fn ser(&self, writer: &mut dyn BitWrite) {
        if self.signed {
            writer.write_bit(self.value < 0);
        }

        let mut magnitude = self.value.unsigned_abs();
        let group = 1_u128 << self.bits;

        loop {
            let proceed = self.variable && magnitude >= group;
            if self.variable {
                writer.write_bit(proceed);
            }
            for _ in 0..self.bits {
                writer.write_bit(magnitude & 1 != 0);
                magnitude >>= 1;
            }
            if !proceed {
                return;
            }
        }
    }

    fn de(reader: &mut BitReader, signed: bool, variable: bool, bits: u8) -> Result<Self, SerdeErr> {
        let negative = if signed { reader.read_bit()? } else { false };

        let mut magnitude: u128 = 0;
        let mut shift: u32 = 0;

        loop {
            let proceed = if variable { reader.read_bit()? } else { false };
            for _ in 0..bits {
                if reader.read_bit()? {
                    if shift >= 127 {
                        return Err(SerdeErr);
                    }
                    magnitude |= 1 << shift;
                }
                shift += 1;
            }
            if !proceed {
                break;
            }
        }

        let value = magnitude as i128;
        Ok(Self {
            value: if negative { -value } else { value },
            signed,
            variable,
            bits,
        })
    }

    fn bit_length(&self) -> u32 {
        let mut output: u32 = if self.signed { 1 } else { 0 };

        if !self.variable {
            return output + <u32 as From<u8>>::from(self.bits);
        }

        let mut magnitude = self.value.unsigned_abs();
        loop {
            output += 1 + <u32 as From<u8>>::from(self.bits);
            if magnitude < 1_u128 << self.bits {
                return output;
            }
            magnitude >>= self.bits;
        }
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> SerdeInteger<SIGNED, VARIABLE, BITS> {
    /// # Panics
    ///
    /// Panics if `value` cannot be represented with this layout. Use
    /// `try_new` for values that come from outside the program.
    pub fn new<T: Into<i128>>(value: T) -> Self {
        let value = value.into();
        match Self::try_new(value) {
            Ok(integer) => integer,
            Err(_) => panic!(
                "{} cannot be encoded in a {}{}-bit {} integer",
                value,
                if VARIABLE { "variable " } else { "" },
                BITS,
                if SIGNED { "signed" } else { "unsigned" },
            ),
        }
    }

    pub fn try_new<T: Into<i128>>(value: T) -> Result<Self, SerdeErr> {
        let inner = IntegerLayout::check(SIGNED, VARIABLE, BITS, value.into())?;
        Ok(Self { inner })
    }

    pub fn get(&self) -> i128 {
        self.inner.value
    }

    pub fn set<T: Into<i128>>(&mut self, value: T) {
        self.inner.value = value.into();
    }

    pub fn to<T: SerdeIntegerConversion<SIGNED, VARIABLE, BITS>>(&self) -> T {
        T::from(self)
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8> Serde
    for SerdeInteger<SIGNED, VARIABLE, BITS>
{
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.inner.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let inner = IntegerLayout::de(reader, SIGNED, VARIABLE, BITS)?;
        Ok(Self { inner })
    }

    fn bit_length(&self) -> u32 {
        self.inner.bit_length()
    }
}

impl<const SIGNED: bool, const BITS: u8> ConstBitLength for SerdeInteger<SIGNED, false, BITS> {
    fn const_bit_length() -> u32 {
        let sign_bit = if SIGNED { 1 } else { 0 };
        sign_bit + BITS as u32
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8, T: Into<i128>> From<T>
    for SerdeInteger<SIGNED, VARIABLE, BITS>
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<const SIGNED: bool, const VARIABLE: bool, const BITS: u8, T: TryFrom<i128> + Default>
    SerdeIntegerConversion<SIGNED, VARIABLE, BITS> for T
{
    fn from(value: &SerdeInteger<SIGNED, VARIABLE, BITS>) -> Self {
        T::try_from(value.inner.value).unwrap_or_default()
    }
}
