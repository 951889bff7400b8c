use crate::config::parser::{ConfigParseError, ConfigParser, DEFAULT_TEMPLATE};
use crate::models::{AppConfig, ConfigError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn from_parse(path: &Path, err: ConfigParseError) -> Self {
        match err {
            ConfigParseError::TomlError(source) => StoreError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ConfigParseError::ValidationError(source) => StoreError::Invalid {
                path: path.to_path_buf(),
                source,
            },
            ConfigParseError::SerializationError(source) => StoreError::Serialization(source),
        }
    }
}

/// Durable storage for the configuration aggregate
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<AppConfig, StoreError>;

    fn save(&self, config: &AppConfig) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub settings_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            settings_path: config_dir.join("winplacer").join("settings.toml"),
        }
    }
}

impl PersistenceConfig {
    pub fn at(settings_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
        }
    }
}

/// Settings stored as a single TOML document
#[derive(Debug)]
pub struct FileConfigStore {
    config: PersistenceConfig,
    parser: ConfigParser,
}

impl FileConfigStore {
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            parser: ConfigParser::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.settings_path
    }

    pub fn exists(&self) -> bool {
        self.config.settings_path.exists()
    }

    /// Write the commented default template. Existing files are kept unless
    /// `overwrite` is set. Returns whether a file was written.
    pub fn initialize(&self, overwrite: bool) -> Result<bool, StoreError> {
        if self.exists() && !overwrite {
            return Ok(false);
        }

        self.write_file_atomic(DEFAULT_TEMPLATE)?;
        info!(path = %self.path().display(), "Wrote default settings template");
        Ok(true)
    }

    /// Load the settings, creating the default template on first start
    pub fn load_or_init(&self) -> Result<AppConfig, StoreError> {
        self.initialize(false)?;
        self.load()
    }

    /// Modification time of the settings file, used to detect manual edits
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(self.path())
            .and_then(|metadata| metadata.modified())
            .ok()
    }

    fn write_file_atomic(&self, content: &str) -> Result<(), StoreError> {
        let path = self.path();
        let write_error = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
        }

        // Atomic write
        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, content).map_err(write_error)?;
        fs::rename(&temp_path, path).map_err(write_error)?;
        Ok(())
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new(PersistenceConfig::default())
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<AppConfig, StoreError> {
        let path = self.path();
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let config = self
            .parser
            .parse_str(&content)
            .map_err(|err| StoreError::from_parse(path, err))?;

        debug!(
            path = %path.display(),
            rules = config.rules().len(),
            cells = config.grid.len(),
            "Loaded settings"
        );
        Ok(config)
    }

    fn save(&self, config: &AppConfig) -> Result<(), StoreError> {
        let content = self
            .parser
            .to_string(config)
            .map_err(|err| StoreError::from_parse(self.path(), err))?;
        self.write_file_atomic(&content)?;

        debug!(path = %self.path().display(), "Saved settings");
        Ok(())
    }
}
