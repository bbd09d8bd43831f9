//! Aggregate engine configuration loaded from JSON and the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::EngineError;
use crate::features::ExtractionConfig;
use crate::interval::IntervalConfig;
use crate::scorer::ScoringConfig;
use crate::surge::SurgeConfig;
use crate::trainer::TrainingConfig;

pub const CONFIG_PATH_ENV: &str = "BULLMATCH_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interval: IntervalConfig,
    pub surge: SurgeConfig,
    pub extraction: ExtractionConfig,
    pub training: TrainingConfig,
    pub scoring: ScoringConfig,
    /// Anchor offset before the interval start used when no volume surge is found.
    pub fallback_offset_periods: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: IntervalConfig::default(),
            surge: SurgeConfig::default(),
            extraction: ExtractionConfig::default(),
            training: TrainingConfig::default(),
            scoring: ScoringConfig::default(),
            fallback_offset_periods: 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(#[from] EngineError),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.interval.max_window_periods == 0 {
            return Err(EngineError::InvalidConfig(
                "interval.max_window_periods must be > 0".to_string(),
            ));
        }
        if !self.interval.min_gain_percent.is_finite() {
            return Err(EngineError::InvalidConfig(
                "interval.min_gain_percent must be finite".to_string(),
            ));
        }
        if self.surge.min_volume_ratio <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "surge.min_volume_ratio must be > 0".to_string(),
            ));
        }
        self.extraction.validate()?;
        self.training.validate()?;
        self.scoring.validate()?;
        Ok(())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;
        info!(
            component = "config",
            event = "config.loaded",
            path = %path.display()
        );
        Ok(config)
    }

    /// Reads the file named by `BULLMATCH_CONFIG`, or returns validated defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(Path::new(path.trim())),
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }
}
