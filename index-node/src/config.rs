//! Configuration loading for bep-index-node.
//!
//! Configuration is loaded from a TOML file (default: `index-node.toml`).

use index_types::FolderInfo;
use serde::Deserialize;
use std::path::PathBuf;

/// Static folder list the applier and the status aggregator consult.
pub trait Configuration: Send + Sync {
    /// All configured folders.
    fn folders(&self) -> Vec<FolderInfo>;

    /// The configured folder with this id, if any.
    fn folder(&self, folder_id: &str) -> Option<FolderInfo> {
        self.folders().into_iter().find(|f| f.folder_id == folder_id)
    }
}

/// Root configuration for bep-index-node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Shared folders.
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the index SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Path to the overflow SQLite database file.
    #[serde(default = "default_temp_database_path")]
    pub temp_database: PathBuf,
    /// Maximum pooled connections to the index database (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// One shared folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FolderConfig {
    /// Folder id, as exchanged with peers.
    pub id: String,
    /// Display label (defaults to the id).
    #[serde(default)]
    pub label: Option<String>,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("index.db")
}

fn default_temp_database_path() -> PathBuf {
    PathBuf::from("index-temp.db")
}

fn default_max_connections() -> u32 {
    4
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            temp_database: default_temp_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl FolderConfig {
    fn to_folder_info(&self) -> FolderInfo {
        match &self.label {
            Some(label) => FolderInfo::new(&self.id, label),
            None => FolderInfo::unlabeled(&self.id),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl Configuration for Config {
    fn folders(&self) -> Vec<FolderInfo> {
        self.folders.iter().map(FolderConfig::to_folder_info).collect()
    }

    fn folder(&self, folder_id: &str) -> Option<FolderInfo> {
        self.folders
            .iter()
            .find(|f| f.id == folder_id)
            .map(FolderConfig::to_folder_info)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
