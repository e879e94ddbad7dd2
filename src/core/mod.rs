//! Core application concerns: configuration and shutdown coordination

pub mod config;
pub mod constants;
pub mod shutdown;

pub use config::{AdvancedConfig, CentralConfig, RollupConfig, StorageConfig};
pub use shutdown::ShutdownSignal;
