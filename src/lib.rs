//! WinPlacer - keeps application windows at configured sizes and positions
//!
//! Rules keyed by process name say how large a window should be and,
//! optionally, where it belongs. An optional grid of ranked anchor points
//! distributes matching windows across fixed slots. A background loop
//! enumerates windows, reconciles them against the rules and moves any
//! window that has drifted from its target.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod platform;
pub mod services;

pub use models::*;
pub use services::*;

/// Result type alias for WinPlacer operations
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to WinPlacer operations
#[derive(thiserror::Error, Debug)]
pub enum WinPlacerError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Window system error: {0}")]
    PlatformError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
