//! Storage module for node record persistence
//!
//! Uses sled embedded database; values are bincode-encoded records.

pub mod records;

pub use records::{RecordStore, StoreError};
