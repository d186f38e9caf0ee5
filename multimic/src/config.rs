//! Configuration management

use anyhow::{Context, Result};
use multimic_audio::{CaptureFormat, CaptureMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default output file prefix
pub const DEFAULT_OUTPUT_PREFIX: &str = "recordedFile";

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Path the configuration was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory recordings are written to
    pub output_dir: PathBuf,

    /// Recordings are named `<output_prefix>-<ordinal>.wav`
    pub output_prefix: String,

    /// Read scheduling across streams
    pub capture_mode: CaptureMode,

    /// Devices to record without prompting (empty = ask interactively)
    pub devices: Vec<usize>,

    /// Stream format shared by every device
    pub capture: CaptureFormat,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            output_dir: PathBuf::from("."),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            capture_mode: CaptureMode::Sequential,
            devices: Vec::new(),
            capture: CaptureFormat::default(),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from the default location, or fall back to defaults
    pub fn load() -> Result<Self> {
        let config_path =
            multimic_paths::get_config_path().context("Failed to determine config path")?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            toml::from_str::<RecorderConfig>(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Save configuration to `config_path`
    pub fn save(&self) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Check prefix and stream format before any device is touched
    pub fn validate(&self) -> Result<()> {
        multimic_paths::validate_prefix(&self.output_prefix)?;
        self.capture.validate().context("Invalid capture format")?;
        Ok(())
    }
}
