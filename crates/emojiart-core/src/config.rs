//! Editor configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Size given to emoji dropped onto the canvas.
pub const DEFAULT_EMOJI_SIZE: i64 = 40;

/// Smallest size scaling may shrink an emoji to.
pub const MIN_EMOJI_SIZE: i64 = 1;

/// Palette every new document starts with.
pub const DEFAULT_PALETTE: &str = "🌎🌻🐼🥐🍉🥬";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Tunables shared by every document in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub default_emoji_size: i64,
    pub min_emoji_size: i64,
    pub default_palette: String,
    /// Directory for file-backed documents. `None` uses the platform default.
    pub storage_dir: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_emoji_size: DEFAULT_EMOJI_SIZE,
            min_emoji_size: MIN_EMOJI_SIZE,
            default_palette: DEFAULT_PALETTE.to_string(),
            storage_dir: None,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.min_emoji_size = config.min_emoji_size.max(1);
        config.default_emoji_size = config.default_emoji_size.max(config.min_emoji_size);
        Ok(config)
    }

    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}
