use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alerts::engine::AlertEngineConfig;
use super::classifier::ScoreThresholds;
use super::error::ConfigError;

/// Where snapshots come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSettings {
    Http {
        base_url: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Scenario {
        #[serde(default = "default_rotation_secs")]
        rotation_secs: u64,
    },
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_rotation_secs() -> u64 {
    20
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::Scenario {
            rotation_secs: default_rotation_secs(),
        }
    }
}

/// Engine settings, persisted as settings.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub poll_interval_ms: u64,
    pub warmup_ms: u64,
    pub test_critical_ms: u64,
    pub test_warning_ms: u64,
    pub start_muted: bool,
    /// Cut-offs for the fallback risk heuristic
    pub score_thresholds: ScoreThresholds,
    /// Per-zone trigger thresholds used when alerts are synthesized locally
    pub alert_engine: AlertEngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            poll_interval_ms: 20_000,
            warmup_ms: 1_000,
            test_critical_ms: 10_000,
            test_warning_ms: 8_000,
            start_muted: false,
            score_thresholds: ScoreThresholds::default(),
            alert_engine: AlertEngineConfig::default(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn test_critical_duration(&self) -> Duration {
        Duration::from_millis(self.test_critical_ms)
    }

    pub fn test_warning_duration(&self) -> Duration {
        Duration::from_millis(self.test_warning_ms)
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        match self.try_load() {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!(
                    "Ignoring {}: {err}; using default settings",
                    self.config_path.display()
                );
                Settings::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<Settings, ConfigError> {
        let content = fs::read_to_string(&self.config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}
