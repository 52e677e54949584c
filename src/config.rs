//! Persisted configuration.
//!
//! Link settings and the physical system parameters are stored as TOML in the
//! platform data directory. Calibration results and efficiency updates are
//! written back through [`save_config`].

use crate::link::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crate version that wrote the file
    #[serde(default = "default_version")]
    pub version: String,
    /// Data directory (not persisted)
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Radio link settings
    #[serde(default)]
    pub link: LinkSettings,
    /// Physical system parameters
    #[serde(default)]
    pub system: SystemParams,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: PathBuf::new(),
            link: LinkSettings::default(),
            system: SystemParams::default(),
        }
    }
}

/// Radio link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Pairing passkey, 0 disables the radio
    pub passkey: u32,
    /// Bluetooth enabled by the user
    pub enabled: bool,
    /// Capacity of the notification frame queue
    pub queue_capacity: usize,
    /// Connect attempt timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Default timeout for synchronous reads in milliseconds
    pub sync_read_timeout_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            passkey: session.passkey,
            enabled: session.enabled,
            queue_capacity: session.queue_capacity,
            connect_timeout_ms: session.connect_timeout_ms,
            sync_read_timeout_ms: session.sync_read_timeout_ms,
        }
    }
}

impl From<&LinkSettings> for SessionConfig {
    fn from(settings: &LinkSettings) -> Self {
        SessionConfig {
            passkey: settings.passkey,
            enabled: settings.enabled,
            queue_capacity: settings.queue_capacity.max(1),
            connect_timeout_ms: settings.connect_timeout_ms,
            sync_read_timeout_ms: settings.sync_read_timeout_ms,
        }
    }
}

/// Physical parameters of bike and rider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemParams {
    /// Total mass of bike, rider and luggage in kg
    pub mass: f32,
    /// Rolling resistance coefficient
    pub cr: f32,
    /// Drag area in m²
    pub cwa: f32,
    /// Typical rider power in watts
    pub avg_rider_power: f32,
    /// Air temperature used until the barometer reports one, °C
    pub default_air_temp: f32,
    /// Altitude used until the barometer reports one, m
    pub default_altitude: f32,
    /// Coast-down runs needed for a calibration
    pub required_run_count: usize,
    /// Drive train efficiency factor
    pub eta: f32,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            mass: 110.0,
            cr: 0.009725,
            cwa: 0.437392,
            avg_rider_power: 100.0,
            default_air_temp: 18.0,
            default_altitude: 520.0,
            required_run_count: 4,
            eta: 0.6,
        }
    }
}

impl SystemParams {
    /// Store freshly fitted resistance coefficients.
    pub fn apply_calibration(&mut self, cr: f32, cwa: f32) {
        tracing::info!(
            "Calibration applied: cR {:.6} -> {:.6}, cwA {:.6} -> {:.6}",
            self.cr,
            cr,
            self.cwa,
            cwa
        );
        self.cr = cr;
        self.cwa = cwa;
    }

    /// Store a new efficiency factor.
    pub fn apply_eta(&mut self, eta: f32) {
        tracing::info!("Efficiency factor {:.3} -> {:.3}", self.eta, eta);
        self.eta = eta;
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "levolink", "LevoLink")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let mut config = load_config_from(&get_config_path())?;
    config.data_dir = get_data_dir();
    Ok(config)
}

/// Load application configuration from `path`, falling back to defaults
/// when the file does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let data_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(AppConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = data_dir;

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save application configuration to `path`.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    tracing::debug!("Config saved to {}", path.display());
    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
