//! Configuration module
//!
//! Handles driver settings and the CLI's saved receiver setup

mod settings;

pub use settings::{
    AppConfig, DeviceSettings, LoggingConfig, DEFAULT_TIMEOUT_MS, MAX_FILL_TIME_MS,
    MIN_FILL_TIME_MS, RING_BUFFER_LENGTH, SPI_BUFFER_LENGTH, SPI_FILL_THRESHOLD_DEFAULT,
    SPI_FILL_THRESHOLD_MAX, STAGING_BUFFER_LENGTH,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "gnsslink", "gnsslink").map(|dirs| dirs.config_dir().to_path_buf())
}
