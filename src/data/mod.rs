//! Data layer: store session abstraction, schema catalog, statement cache,
//! and the aggregate store built on top of them.
//!
//! The engine assumes only per-key range reads returning rows in ascending
//! clustering order and per-row TTLs on writes; every reduction happens here,
//! never in the store. Production deployments plug a wide-column driver into
//! [`store::Session`]; [`memory::MemorySession`] implements the same contract
//! in process for tests and embedded use.

pub mod aggregate;
pub mod codec;
pub mod error;
pub mod expiry;
pub mod full_query_text;
pub mod memory;
pub mod schema;
pub mod statements;
pub mod store;

pub use error::StoreError;
