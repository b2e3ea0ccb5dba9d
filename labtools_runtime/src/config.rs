//! Runtime configuration.
//!
//! Read from a JSON file. Every field has a default, so a partial file (or
//! no file at all) is valid. Unknown fields are rejected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RuntimeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Folder holding one sub-folder per project.
    pub projects_dir: PathBuf,
    /// Extension of origin files, without the dot.
    pub origin_extension: String,
    /// Extension of project manifest files, without the dot.
    pub project_extension: String,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            projects_dir: PathBuf::from("Projects"),
            origin_extension: "ori".to_string(),
            project_extension: "ltp".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `path`, or fall back to defaults when the file does not exist.
    /// A present but malformed file is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, RuntimeError> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write as pretty JSON. Creates parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), RuntimeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes())?;
        Ok(())
    }
}
