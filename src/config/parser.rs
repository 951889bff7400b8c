use crate::models::{AppConfig, ConfigError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigParseError {
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),
    #[error("Validation error: {0}")]
    ValidationError(#[from] ConfigError),
}

/// Template written on first start so the daemon can run headless and the
/// user has something to edit by hand.
pub const DEFAULT_TEMPLATE: &str = r#"# WinPlacer settings
#
# Every [[rules]] entry keeps the windows of one process at a fixed size and,
# with use_coordinates = true, at a fixed position. Windows whose title is
# listed in excluded_titles are left alone.
#
# [[rules]]
# process_name = "notepad.exe"
# use_coordinates = true
# x = 100
# y = 100
# width = 800
# height = 600
# excluded_titles = ["Save As", "Open"]
#
# When the grid is enabled, matched windows are placed on the cells below in
# rank order (rank 0 is filled first) instead of at their rule coordinates.
# assignment = "recompute" reassigns cells from scratch on every pass,
# assignment = "sticky" lets a window keep the cell it already holds.
#
# [[grid.cells]]
# rank = 0
# x = 0
# y = 0

rules = []

[engine]
poll_interval_ms = 250
reload_interval_ms = 2000

[grid]
enabled = false
assignment = "recompute"
cells = []
"#;

/// Converts between the settings document and the configuration model
#[derive(Debug, Default)]
pub struct ConfigParser;

impl ConfigParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a settings document, repair cell ordering and validate the result
    pub fn parse_str(&self, content: &str) -> Result<AppConfig, ConfigParseError> {
        let mut config: AppConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn to_string(&self, config: &AppConfig) -> Result<String, ConfigParseError> {
        config.validate()?;
        Ok(toml::to_string_pretty(config)?)
    }
}
