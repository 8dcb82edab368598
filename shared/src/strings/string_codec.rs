use ghostnet_serde::{read_bits, write_bits, BitReader, BitWrite, Serde, SerdeErr};

use crate::constants::{STRING_ENTRY_BIT_SIZE, STRING_TAG_PREFIX_BYTE};

/// Leading 2-bit code of a packed string
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringCode {
    Null = 0,
    CString = 1,
    Tag = 2,
    Integer = 3,
}

impl StringCode {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => StringCode::Null,
            1 => StringCode::CString,
            2 => StringCode::Tag,
            _ => StringCode::Integer,
        }
    }
}

/// Chooses the cheapest encoding for `string`
pub fn classify_string(string: &str) -> StringCode {
    if string.is_empty() {
        return StringCode::Null;
    }
    if let Some(rest) = string.strip_prefix(STRING_TAG_PREFIX_BYTE) {
        if parse_tag(rest).is_some() {
            return StringCode::Tag;
        }
        return StringCode::CString;
    }
    if parse_canonical_integer(string).is_some() {
        return StringCode::Integer;
    }
    StringCode::CString
}

/// Packs `string` as a 2-bit code followed by the cheapest body
pub fn pack_string(writer: &mut dyn BitWrite, string: &str) {
    let code = classify_string(string);
    write_bits(writer, code as u32, 2);

    match code {
        StringCode::Null => {}
        StringCode::CString => string.to_string().ser(writer),
        StringCode::Tag => {
            let tag = string
                .strip_prefix(STRING_TAG_PREFIX_BYTE)
                .and_then(parse_tag)
                .unwrap_or_default();
            write_bits(writer, tag, STRING_ENTRY_BIT_SIZE);
        }
        StringCode::Integer => {
            let value = parse_canonical_integer(string).unwrap_or_default();
            write_integer(writer, value);
        }
    }
}

/// Reads a string written by [`pack_string`]
pub fn unpack_string(reader: &mut BitReader) -> Result<String, SerdeErr> {
    match StringCode::from_bits(read_bits(reader, 2)?) {
        StringCode::Null => Ok(String::new()),
        StringCode::CString => String::de(reader),
        StringCode::Tag => {
            let tag = read_bits(reader, STRING_ENTRY_BIT_SIZE)?;
            Ok(format!("{}{}", STRING_TAG_PREFIX_BYTE, tag))
        }
        StringCode::Integer => Ok(read_integer(reader)?.to_string()),
    }
}

// Integers are written as a sign flag and a magnitude in the smallest of 7,
// 15 or 31 bits. Negative values store `-value - 1` so the whole i32 range fits.
fn write_integer(writer: &mut dyn BitWrite, value: i32) {
    let negative = value < 0;
    let magnitude = if negative {
        (-(i64::from(value)) - 1) as u32
    } else {
        value as u32
    };

    writer.write_bit(negative);
    if magnitude < 128 {
        writer.write_bit(true);
        write_bits(writer, magnitude, 7);
        return;
    }
    writer.write_bit(false);
    if magnitude < 32768 {
        writer.write_bit(true);
        write_bits(writer, magnitude, 15);
        return;
    }
    writer.write_bit(false);
    write_bits(writer, magnitude, 31);
}

fn read_integer(reader: &mut BitReader) -> Result<i64, SerdeErr> {
    let negative = reader.read_bit()?;
    let magnitude = if reader.read_bit()? {
        read_bits(reader, 7)?
    } else if reader.read_bit()? {
        read_bits(reader, 15)?
    } else {
        read_bits(reader, 31)?
    };

    let magnitude = i64::from(magnitude);
    Ok(if negative { -magnitude - 1 } else { magnitude })
}

/// A string is sent as an integer only if printing the parsed value gives the
/// same string back, so "007" or "+5" keep their spelling.
fn parse_canonical_integer(string: &str) -> Option<i32> {
    let first = string.chars().next()?;
    if first != '-' && !first.is_ascii_digit() {
        return None;
    }
    let value: i32 = string.parse().ok()?;
    if value.to_string() == string {
        Some(value)
    } else {
        None
    }
}

fn parse_tag(rest: &str) -> Option<u32> {
    let tag: u32 = rest.parse().ok()?;
    if tag < (1 << STRING_ENTRY_BIT_SIZE) && tag.to_string() == rest {
        Some(tag)
    } else {
        None
    }
}
