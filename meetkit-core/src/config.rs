use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// SDK configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub uplink: UplinkPolicyConfig,
    pub negotiation: NegotiationConfig,
}

/// Logging settings for hosts that let the SDK install its own subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level applied to the meetkit crates; everything else logs at warn
    pub level: String,
    pub format: LogFormat,
    /// Append to this file instead of stderr
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Timing and bandwidth constants of the simulcast uplink policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkPolicyConfig {
    /// Bandwidth assumed before the estimate is trusted (kbps)
    pub default_uplink_kbps: f64,
    /// Window after the first sample during which the default is used
    pub startup_duration_ms: u64,
    /// Base cooldown after a transition
    pub hold_down_duration_ms: u64,
    /// Capture frame rate reported to the encoder
    pub default_max_frame_rate: u32,
}

impl Default for UplinkPolicyConfig {
    fn default() -> Self {
        Self {
            default_uplink_kbps: 1200.0,
            startup_duration_ms: 6000,
            hold_down_duration_ms: 4000,
            default_max_frame_rate: 15,
        }
    }
}

impl UplinkPolicyConfig {
    #[must_use]
    pub const fn startup_duration(&self) -> Duration {
        Duration::from_millis(self.startup_duration_ms)
    }

    #[must_use]
    pub const fn hold_down_duration(&self) -> Duration {
        Duration::from_millis(self.hold_down_duration_ms)
    }
}

/// Behaviour switches for the subscribe exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Send several encodings of the local video
    pub enable_simulcast: bool,
    /// Media sections follow unified-plan semantics, so the subscription
    /// array has to be realigned with the negotiated sections
    pub requires_unified_plan: bool,
    /// The local description has to be rewritten before the backend accepts it
    pub requires_unified_plan_munging: bool,
    /// Upper bound a driver should put on a single subscribe exchange
    pub subscribe_ack_timeout_ms: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            enable_simulcast: true,
            requires_unified_plan: true,
            requires_unified_plan_munging: false,
            subscribe_ack_timeout_ms: 15_000,
        }
    }
}

impl NegotiationConfig {
    #[must_use]
    pub const fn subscribe_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_ack_timeout_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // MEETKIT_NEGOTIATION__ENABLE_SIMULCAST=false, etc.
        builder = builder.add_source(
            Environment::with_prefix("MEETKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.logging.level, "info");
        assert!((config.uplink.default_uplink_kbps - 1200.0).abs() < f64::EPSILON);
        assert_eq!(config.uplink.startup_duration(), Duration::from_secs(6));
        assert_eq!(config.uplink.hold_down_duration(), Duration::from_secs(4));
        assert!(config.negotiation.enable_simulcast);
        assert_eq!(
            config.negotiation.subscribe_ack_timeout(),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetkit.toml");
        std::fs::write(
            &path,
            "[negotiation]\nenable_simulcast = false\n\n[uplink]\nhold_down_duration_ms = 1000\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert!(!config.negotiation.enable_simulcast);
        assert!(config.negotiation.requires_unified_plan);
        assert_eq!(config.uplink.hold_down_duration_ms, 1000);
        assert_eq!(config.uplink.startup_duration_ms, 6000);
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meetkit.toml");
        std::fs::write(&path, "[uplink]\nhold_down_duration_ms = \"soon\"\n").unwrap();

        let err = Config::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some("/nonexistent/meetkit.toml")).unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }
}
