//! Configuration for autoscroll sessions.
//!
//! All settings have serde defaults, so an empty TOML document is a valid
//! config. The embedding layer typically loads one config at startup and
//! shares it across every notebook panel it attaches.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Metadata key persisted into each notebook document.
pub const METADATA_KEY: &str = "autoscrollcelloutput";

/// Smallest poll interval accepted by validation.
///
/// Below this the tick starts competing with signal delivery for no visible
/// benefit; the scroll decision is height-gated anyway.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable pretty format (default for interactive use)
    #[default]
    Pretty,
    /// Machine-parseable JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format: {other} (expected 'pretty' or 'json')"
            )),
        }
    }
}

/// Presentation of the toolbar toggle button.
///
/// The embedding layer reads this when inserting the button; the session core
/// only ever touches the pressed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// Button label text
    pub label: String,
    /// Hover tooltip
    pub tooltip: String,
    /// CSS class applied to the button node
    pub class_name: String,
    /// CSS class providing the icon
    pub icon_class: String,
    /// Insertion position in the panel toolbar
    pub toolbar_position: u32,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            label: "scroll".to_string(),
            tooltip: "Auto Scroll Cell Output".to_string(),
            class_name: "buttonAutoScrollCellOutput".to_string(),
            icon_class: "wll-ScrollIcon".to_string(),
            toolbar_position: 10,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoScrollConfig {
    /// Tick cadence of the poll task, in milliseconds
    pub poll_interval_ms: u64,

    /// Notebook metadata key holding the per-notebook enabled flag
    pub metadata_key: String,

    /// Initial enabled state written into metadata on panel attach
    pub enabled_by_default: bool,

    /// Capacity of the signal hub buffer
    pub signal_buffer: usize,

    /// Toolbar button presentation
    pub button: ButtonConfig,

    /// Logging settings
    pub log: crate::logging::LogConfig,
}

impl Default for AutoScrollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            metadata_key: METADATA_KEY.to_string(),
            enabled_by_default: true,
            signal_buffer: 1024,
            button: ButtonConfig::default(),
            log: crate::logging::LogConfig::default(),
        }
    }
}

impl AutoScrollConfig {
    /// Poll cadence as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let interval = self.poll_interval();
        if interval < MIN_POLL_INTERVAL {
            return Err(ConfigError::PollIntervalTooShort {
                min: MIN_POLL_INTERVAL,
                got: interval,
            });
        }
        if self.metadata_key.trim().is_empty() {
            return Err(ConfigError::EmptyMetadataKey);
        }
        if self.signal_buffer == 0 {
            return Err(ConfigError::ZeroSignalBuffer);
        }
        Ok(())
    }

    /// Parse and validate a TOML config document.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on parse failure or invalid values.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the file cannot be read, parsed, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
