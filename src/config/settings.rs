//! Device and application settings

use crate::core::capability::ModuleType;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default response timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default ring buffer size
pub const RING_BUFFER_LENGTH: usize = 2048;
/// Default staging buffer size for one fill pass
pub const STAGING_BUFFER_LENGTH: usize = 1024;
/// Shortest time a fill waits for the first byte
pub const MIN_FILL_TIME_MS: u64 = 100;
/// Longest time a pre-request drain runs
pub const MAX_FILL_TIME_MS: u64 = 2000;
/// Default run of SPI fill bytes treated as idle
pub const SPI_FILL_THRESHOLD_DEFAULT: usize = 48;
/// Largest allowed SPI fill threshold
pub const SPI_FILL_THRESHOLD_MAX: usize = 255;
/// SPI shadow buffer size
pub const SPI_BUFFER_LENGTH: usize = 1024;

/// Per-device driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Response timeout for request/response exchanges
    pub timeout_ms: u64,
    /// Size of the shared receive ring buffer
    pub ring_buffer_length: usize,
    /// Size of the staging buffer used by a fill pass
    pub staging_buffer_length: usize,
    /// First-byte wait of a single fill
    pub min_fill_time_ms: u64,
    /// Total budget of the drain before a request
    pub max_fill_time_ms: u64,
    /// Run of 0xFF on SPI treated as idle (0 disables filtering)
    pub spi_fill_threshold: usize,
    /// Size of the SPI shadow buffer
    pub spi_buffer_length: usize,
    /// Receiver port the host is attached to (0 I2C, 1 UART1, 2 UART2, 3 USB, 4 SPI)
    pub port_number: u8,
    /// Hex-dump UBX traffic at debug level
    pub print_ubx_messages: bool,
    /// How long `stop` waits for the message receive worker
    pub receive_task_grace_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            ring_buffer_length: RING_BUFFER_LENGTH,
            staging_buffer_length: STAGING_BUFFER_LENGTH,
            min_fill_time_ms: MIN_FILL_TIME_MS,
            max_fill_time_ms: MAX_FILL_TIME_MS,
            spi_fill_threshold: SPI_FILL_THRESHOLD_DEFAULT,
            spi_buffer_length: SPI_BUFFER_LENGTH,
            port_number: 1,
            print_ubx_messages: false,
            receive_task_grace_ms: 1000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Receiver generation
    pub module: ModuleType,
    /// Serial port the receiver is on
    pub serial: SerialConfig,
    /// Driver settings
    pub device: DeviceSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the user's config directory
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = super::config_dir()
            .ok_or("Could not determine config directory")?
            .join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load config from a file, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the user's config directory
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = super::config_dir().ok_or("Could not determine config directory")?;
        std::fs::create_dir_all(&dir)?;
        self.save_to(&dir.join("config.toml"))
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_driver_constants() {
        let settings = DeviceSettings::default();
        assert_eq!(settings.timeout_ms, 10_000);
        assert_eq!(settings.ring_buffer_length, 2048);
        assert_eq!(settings.spi_fill_threshold, 48);
        assert_eq!(settings.min_fill_time_ms, 100);
        assert_eq!(settings.max_fill_time_ms, 2000);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.module = ModuleType::M10;
        config.serial.port = "/dev/ttyUSB3".to_string();
        config.device.print_ubx_messages = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "module = \"m9\"\n[device]\ntimeout_ms = 500\n").unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.module, ModuleType::M9);
        assert_eq!(loaded.device.timeout_ms, 500);
        assert_eq!(loaded.device.ring_buffer_length, RING_BUFFER_LENGTH);
    }
}
