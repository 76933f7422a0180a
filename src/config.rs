//! Configuration for the interview integrity monitor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sampling cadence of the detection scheduler
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Debounce thresholds and cooldowns
    #[serde(default)]
    pub thresholds: DetectionThresholds,

    /// Environment tamper monitoring
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Where session reports are written
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("interview-integrity-monitor");

        Self {
            sampling: SamplingConfig::default(),
            thresholds: DetectionThresholds::default(),
            environment: EnvironmentConfig::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("interview-integrity-monitor")
            .join("config.json")
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.sample_rate_hz == 0 {
            return Err(ConfigError::Invalid("sample_rate_hz must be positive".into()));
        }
        if self.sampling.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }

        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.gaze_score) {
            return Err(ConfigError::Invalid(format!(
                "gaze_score threshold {} outside [0, 1]",
                t.gaze_score
            )));
        }
        for (name, degrees) in [
            ("head_yaw_degrees", t.head_yaw_degrees),
            ("head_yaw_high_degrees", t.head_yaw_high_degrees),
        ] {
            if !degrees.is_finite() || !(0.0..=90.0).contains(&degrees) {
                return Err(ConfigError::Invalid(format!(
                    "{name} {degrees} outside [0, 90]"
                )));
            }
        }
        Ok(())
    }
}

/// How often the scheduler samples the video source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Upper bound on processed samples per second
    pub sample_rate_hz: u32,

    /// Cadence of the host loop that offers ticks (redraw rate)
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 10,
            poll_interval: Duration::from_millis(16),
        }
    }
}

impl SamplingConfig {
    /// Minimum spacing between processed samples.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.sample_rate_hz.max(1)))
    }
}

/// Thresholds, debounce durations and cooldown for video-derived violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// |yaw| above this is a head turn
    pub head_yaw_degrees: f64,
    /// |yaw| above this makes a head-turn event high severity
    pub head_yaw_high_degrees: f64,
    /// Gaze score above this is gaze aversion
    pub gaze_score: f64,
    #[serde(with = "duration_ms")]
    pub head_turn_duration: Duration,
    #[serde(with = "duration_ms")]
    pub gaze_duration: Duration,
    #[serde(with = "duration_ms")]
    pub face_absent_duration: Duration,
    /// Minimum spacing between two events of the same subtype
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            head_yaw_degrees: 30.0,
            head_yaw_high_degrees: 45.0,
            gaze_score: 0.55,
            head_turn_duration: Duration::from_millis(2_000),
            gaze_duration: Duration::from_millis(3_000),
            face_absent_duration: Duration::from_millis(3_000),
            cooldown: Duration::from_millis(8_000),
        }
    }
}

/// Environment monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Request fullscreen when monitoring starts
    pub enforce_fullscreen: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enforce_fullscreen: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling.sample_rate_hz, 10);
        assert_eq!(config.sampling.sample_interval(), Duration::from_millis(100));
        assert_eq!(config.thresholds.head_yaw_degrees, 30.0);
        assert_eq!(config.thresholds.cooldown, Duration::from_secs(8));
        assert!(config.environment.enforce_fullscreen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["thresholds"]["head_turn_duration"], 2000);
        assert_eq!(json["sampling"]["poll_interval"], 16);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let json = r#"{ "data_path": "/tmp/x", "sampling": { "sample_rate_hz": 5, "poll_interval": 20 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.sampling.sample_interval(), Duration::from_millis(200));
        assert_eq!(config.thresholds, DetectionThresholds::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.sampling.sample_rate_hz = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.thresholds.gaze_score = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thresholds.head_yaw_degrees = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let path = std::env::temp_dir()
            .join("integrity-monitor-config-test")
            .join("config.json");
        let mut config = Config::default();
        config.thresholds.cooldown = Duration::from_millis(5_000);

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("integrity-monitor-does-not-exist.json");
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.thresholds, DetectionThresholds::default());
    }
}
