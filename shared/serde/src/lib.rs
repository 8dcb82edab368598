//! # Ghostnet Serde
//! Bit-level reading & writing for the ghostnet packet formats.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod bit_reader;
mod bit_writer;
mod constants;
mod error;
mod integer;
mod serde;
mod stream_writer;

pub use bit_reader::BitReader;
pub use bit_writer::{BitCounter, BitWrite, BitWriter};
pub use constants::{MAX_PACKET_DATA_SIZE, MAX_PACKET_DATA_SIZE_BITS};
pub use error::SerdeErr;
pub use integer::{
    SerdeInteger, SerdeIntegerConversion, SignedInteger, SignedVariableInteger, UnsignedInteger,
    UnsignedVariableInteger,
};
pub use serde::{bits_required, read_bits, write_bits, ConstBitLength, Serde};
pub use stream_writer::StreamWriter;
