pub mod error;
pub mod file_store;
pub mod file_transfer;
