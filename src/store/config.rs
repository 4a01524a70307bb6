//! Store configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Store backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// JSON-lines files on disk (default)
    #[default]
    File,
    /// Process memory, lost on exit
    Memory,
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Where and how documents are stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendType,

    /// Root directory for the file backend
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            base_dir: default_base_dir(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "oulad", "oulad")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".oulad").join("store"))
}
