//! Configuration management for WinPlacer

pub mod parser;
pub mod persistence;
pub mod snapshot;

pub use parser::{ConfigParseError, ConfigParser, DEFAULT_TEMPLATE};
pub use persistence::{ConfigStore, FileConfigStore, PersistenceConfig, StoreError};
pub use snapshot::ConfigHandle;
