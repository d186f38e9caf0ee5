//! Config and output path utilities for multimic.
//!
//! # Platform Behavior
//!
//! | Platform | Config File |
//! |----------|-------------|
//! | Linux    | `~/.config/multimic/config.toml` |
//! | macOS    | `~/Library/Application Support/multimic/config.toml` |
//! | Windows  | `%APPDATA%/multimic/config.toml` |
//!
//! Recordings are written as `<prefix>-<ordinal>.wav` into a caller-chosen
//! output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("Could not determine config directory")]
    NoConfigDirectory,

    #[error("Output path exists and is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Invalid file prefix {0:?}: must be non-empty and contain no path separators")]
    InvalidPrefix(String),
}

/// Application identifier used in path construction.
const APP_NAME: &str = "multimic";

/// Config file name inside the config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Extension of every recording.
const RECORDING_EXTENSION: &str = "wav";

/// Get the configuration directory. Does not create it.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/multimic`
/// - **macOS**: `~/Library/Application Support/multimic`
/// - **Windows**: `%APPDATA%/multimic`
pub fn get_config_dir() -> Result<PathBuf> {
    let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
    Ok(config_base.join(APP_NAME))
}

/// Get the default config file path.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Create the output directory (and parents) if needed.
///
/// # Errors
/// Fails if the path exists as a file or cannot be created.
pub fn ensure_output_dir(dir: &Path) -> Result<PathBuf> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(PathError::NotADirectory(dir.to_path_buf()).into());
        }
        return Ok(dir.to_path_buf());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    Ok(dir.to_path_buf())
}

/// Check that a prefix yields a plain file name.
pub fn validate_prefix(prefix: &str) -> std::result::Result<(), PathError> {
    let bad = prefix.is_empty()
        || prefix == "."
        || prefix == ".."
        || prefix.contains(['/', '\\']);

    if bad {
        return Err(PathError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// File name for the recording at `ordinal`: `<prefix>-<ordinal>.wav`.
pub fn recording_file_name(prefix: &str, ordinal: usize) -> String {
    format!("{}-{}.{}", prefix, ordinal, RECORDING_EXTENSION)
}

/// Full path for the recording at `ordinal` inside `dir`.
pub fn recording_path(dir: &Path, prefix: &str, ordinal: usize) -> PathBuf {
    dir.join(recording_file_name(prefix, ordinal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        let path = get_config_path().expect("Should get config path");
        assert!(path.ends_with("multimic/config.toml") || path.ends_with("multimic\\config.toml"));
    }

    #[test]
    fn test_recording_file_name() {
        assert_eq!(recording_file_name("recordedFile", 0), "recordedFile-0.wav");
        assert_eq!(recording_file_name("take", 12), "take-12.wav");
    }

    #[test]
    fn test_recording_path() {
        let path = recording_path(Path::new("/tmp/out"), "mic", 3);
        assert_eq!(path, PathBuf::from("/tmp/out/mic-3.wav"));
    }

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("recordedFile").is_ok());
        assert!(validate_prefix("take.1").is_ok());
        assert_eq!(validate_prefix(""), Err(PathError::InvalidPrefix(String::new())));
        assert!(validate_prefix("..").is_err());
        assert!(validate_prefix("a/b").is_err());
        assert!(validate_prefix("a\\b").is_err());
    }

    #[test]
    fn test_ensure_output_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");

        let dir = ensure_output_dir(&nested).expect("Should create directory");
        assert!(dir.is_dir());

        // Existing directory is fine
        ensure_output_dir(&nested).expect("Should accept existing directory");
    }

    #[test]
    fn test_ensure_output_dir_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("taken");
        fs::write(&file, b"x").unwrap();

        let err = ensure_output_dir(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
