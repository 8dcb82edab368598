pub mod string_codec;
pub mod string_table;
