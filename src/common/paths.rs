//! Configuration file location
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/flowprobe/`
//! - macOS: `~/Library/Application Support/flowprobe/`
//! - Windows: `%APPDATA%\flowprobe\`

use std::path::PathBuf;

/// Application name used for config and data directories
const APP_NAME: &str = "flowprobe";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the default configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
