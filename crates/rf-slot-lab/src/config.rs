//! Session configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::gamble::GambleConfig;
use crate::jackpot::JackpotConfig;
use crate::timing::ReelTimingConfig;
use crate::win_tiers::{LEGACY_BIG_WIN_THRESHOLD, TierConfig};

/// Everything a session controller needs, validated once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tiers: TierConfig,
    pub jackpots: JackpotConfig,
    pub reel_timing: ReelTimingConfig,
    pub gamble: GambleConfig,
    /// Reels on screen
    pub reel_count: u8,
    pub starting_balance: f64,
    /// Jackpot contribution tick (ms)
    pub jackpot_tick_ms: u64,
    /// Wins below this multiple of the bet are credited without a presentation
    pub presentation_threshold: f64,
    /// Wins at or above this multiple of the bet get anticipation before the last reel
    pub anticipation_threshold: f64,
    /// Start in turbo mode
    pub turbo: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tiers: TierConfig::legacy(),
            jackpots: JackpotConfig::legacy(),
            reel_timing: ReelTimingConfig::default(),
            gamble: GambleConfig::default(),
            reel_count: 5,
            starting_balance: 1000.0,
            jackpot_tick_ms: 100,
            presentation_threshold: 1.0,
            anticipation_threshold: LEGACY_BIG_WIN_THRESHOLD,
            turbo: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yml::from_str(yaml).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            Some("yaml" | "yml") => Self::from_yaml_str(&text)?,
            other => {
                return Err(ConfigurationError::Parse(format!(
                    "unsupported config extension {:?} ({})",
                    other,
                    path.display()
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigurationError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.tiers.validate()?;
        self.jackpots.validate()?;
        self.reel_timing.validate()?;
        self.gamble.validate()?;

        if self.reel_count == 0 {
            return Err(ConfigurationError::Empty("reel_count must be at least 1".into()));
        }
        self.reel_timing.check_stop_order(self.reel_count as usize)?;
        if !(self.starting_balance.is_finite() && self.starting_balance >= 0.0) {
            return Err(ConfigurationError::Malformed(format!(
                "starting balance must be a non-negative number, got {}",
                self.starting_balance
            )));
        }
        if self.jackpot_tick_ms == 0 {
            return Err(ConfigurationError::Timing("jackpot tick must be > 0ms".into()));
        }
        for (name, value) in [
            ("presentation_threshold", self.presentation_threshold),
            ("anticipation_threshold", self.anticipation_threshold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigurationError::Malformed(format!(
                    "{name} must be a non-negative multiplier, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reel_count, 5);
        assert_eq!(config.anticipation_threshold, 20.0);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SessionConfig::default();
        let json = config.to_json().unwrap();
        let back = SessionConfig::from_json_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "reel_count: 3\nstarting_balance: 250.0\nturbo: true\n";
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.reel_count, 3);
        assert_eq!(config.starting_balance, 250.0);
        assert!(config.turbo);
        assert_eq!(config.tiers, TierConfig::legacy());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SessionConfig {
            reel_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigurationError::Empty(_))));

        config.reel_count = 5;
        config.jackpot_tick_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigurationError::Timing(_))));

        config.jackpot_tick_ms = 100;
        config.presentation_threshold = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigurationError::Malformed(_))));
    }

    #[test]
    fn test_out_of_order_reel_stops_rejected() {
        let mut config = SessionConfig::default();
        config.reel_timing.per_reel_extra_ms = vec![0, 0, 0, 1000, 0];
        assert!(matches!(config.validate(), Err(ConfigurationError::Timing(_))));

        // A late last reel is fine
        config.reel_timing.per_reel_extra_ms = vec![0, 0, 0, 0, 1000];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_tiers_fatal() {
        let mut config = SessionConfig::default();
        config.tiers.regular_tiers.clear();
        config.tiers.big_win_tiers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            SessionConfig::from_json_str("{ not json"),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let path = std::env::temp_dir().join("rf-slot-lab-config-test.toml");
        std::fs::write(&path, "reel_count = 5").unwrap();
        let result = SessionConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigurationError::Parse(_))));
    }

    #[test]
    fn test_load_yaml_file() {
        let path = std::env::temp_dir().join("rf-slot-lab-config-test.yaml");
        std::fs::write(&path, "reel_count: 4\n").unwrap();
        let result = SessionConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(result.unwrap().reel_count, 4);
    }
}
