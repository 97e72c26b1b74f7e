use anyhow::{Context, Result};
use serde::Deserialize;

// Re-export component config types
pub use crate::api::ApiConfig;
pub use crate::connection::ConnectionConfig;

/// Marker animation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    /// Wall-clock length of one marker transition (milliseconds)
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Interpolation steps per transition
    #[serde(default = "default_steps")]
    pub steps: u32,
}

fn default_duration_ms() -> u64 {
    1000
}

fn default_steps() -> u32 {
    60
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            steps: default_steps(),
        }
    }
}

/// Staleness classification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StalenessConfig {
    /// Records silent beyond this window are considered lost/offline (seconds)
    #[serde(default = "default_threshold_seconds")]
    pub threshold_seconds: i64,
}

fn default_threshold_seconds() -> i64 {
    crate::location::STALE_THRESHOLD_SECONDS
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            threshold_seconds: default_threshold_seconds(),
        }
    }
}

/// Complete fleetpulse configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetpulseConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<FleetpulseConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: FleetpulseConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file '{}'", path))?;
    Ok(config)
}
