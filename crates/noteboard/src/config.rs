#![forbid(unsafe_code)]

//! Board configuration.
//!
//! ```toml
//! history_limit = 100
//! default_color = "00aaff"
//! default_size = 3.0
//! default_dash = "2 1"
//! max_id_attempts = 0   # retry id allocation forever
//! ```
//!
//! ```rust,ignore
//! let config = BoardConfig::from_toml_file("noteboard.toml")?.validated()?;
//! let session = BoardSession::with_config("board", &config);
//! ```
//!
//! Missing keys keep their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::{Color, DashPattern};
use crate::error::ConfigError;
use crate::history::HistoryConfig;
use crate::model::StyleDefaults;

/// Tunables for a board and its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Undoable transactions kept. Zero disables history.
    pub history_limit: usize,
    /// Color of the first connection created without an explicit color.
    pub default_color: Color,
    /// Stroke size of the first connection created without an explicit size.
    pub default_size: f64,
    /// Dash pattern of the first connection created without an explicit one.
    pub default_dash: DashPattern,
    /// Random draws before note id allocation gives up. Zero retries forever.
    pub max_id_attempts: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let style = StyleDefaults::default();
        Self {
            history_limit: 50,
            default_color: style.color,
            default_size: style.size,
            default_dash: style.dash,
            max_id_attempts: 1024,
        }
    }
}

impl BoardConfig {
    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.default_size.is_finite() || self.default_size <= 0.0 {
            errors.push(format!(
                "default_size must be > 0, got {}",
                self.default_size
            ));
        }

        errors
    }

    /// `self`, or every validation error at once.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    #[must_use]
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            limit: self.history_limit,
        }
    }

    #[must_use]
    pub fn style_defaults(&self) -> StyleDefaults {
        StyleDefaults {
            color: self.default_color.clone(),
            size: self.default_size,
            dash: self.default_dash.clone(),
        }
    }
}
