//! Feature template: per-feature statistics and their on-disk JSON record.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::features::{assert_schema_compatible, feature_schema, FeatureName, SchemaError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
}

impl FeatureStats {
    /// Finite values, `std_dev >= 0` and `min <= median <= max`.
    pub fn is_consistent(&self) -> bool {
        let finite = [self.mean, self.median, self.std_dev, self.min, self.max]
            .iter()
            .all(|v| v.is_finite());
        finite && self.std_dev >= 0.0 && self.min <= self.median && self.median <= self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Outcome of the calibration loop. Not converging is reported, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Converged,
    MaxIterationsExceeded { failing_samples: Vec<String> },
}

impl CalibrationStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub status: CalibrationStatus,
    pub iterations: usize,
    pub target_min_match: f64,
    pub min_self_match: f64,
}

/// A template feature dropped while loading, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFeature {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTemplate {
    pub trained_at: DateTime<Utc>,
    pub sample_count: usize,
    pub features: BTreeMap<FeatureName, FeatureStats>,
    pub training_ids: Vec<String>,
    pub calibration: Option<CalibrationSummary>,
    /// Filled only by loading; never persisted.
    pub skipped_features: Vec<SkippedFeature>,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template io error: {0}")]
    Io(#[from] io::Error),
    #[error("template json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("template schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
    #[error("cannot train a template from an empty sample set")]
    EmptyTrainingSet,
}

impl From<SchemaError> for TemplateError {
    fn from(value: SchemaError) -> Self {
        match value {
            SchemaError::VersionMismatch { expected, actual } => {
                Self::SchemaVersionMismatch { expected, actual }
            }
            SchemaError::FingerprintMismatch { expected, actual } => {
                Self::SchemaFingerprintMismatch { expected, actual }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TemplateRecord {
    schema_version: u32,
    fingerprint: String,
    trained_at: DateTime<Utc>,
    sample_count: usize,
    features: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    training_ids: Vec<String>,
    #[serde(default)]
    calibration: Option<CalibrationSummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStats {
    mean: Option<f64>,
    median: Option<f64>,
    std_dev: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    sample_count: Option<usize>,
}

impl RawStats {
    fn into_stats(self) -> Result<FeatureStats, String> {
        let field = |value: Option<f64>, name: &str| value.ok_or_else(|| format!("missing {name}"));
        let stats = FeatureStats {
            mean: field(self.mean, "mean")?,
            median: field(self.median, "median")?,
            std_dev: field(self.std_dev, "std_dev")?,
            min: field(self.min, "min")?,
            max: field(self.max, "max")?,
            sample_count: self.sample_count.ok_or_else(|| "missing sample_count".to_string())?,
        };
        if !stats.is_consistent() {
            return Err("inconsistent statistics".to_string());
        }
        Ok(stats)
    }
}

impl FeatureTemplate {
    pub fn new(
        features: BTreeMap<FeatureName, FeatureStats>,
        sample_count: usize,
        training_ids: Vec<String>,
    ) -> Self {
        Self {
            trained_at: Utc::now(),
            sample_count,
            features,
            training_ids,
            calibration: None,
            skipped_features: Vec::new(),
        }
    }

    pub fn get(&self, name: FeatureName) -> Option<&FeatureStats> {
        self.features.get(&name)
    }

    pub fn to_json_string(&self) -> Result<String, TemplateError> {
        let schema = feature_schema();
        let features = self
            .features
            .iter()
            .map(|(name, stats)| Ok((name.as_str().to_string(), serde_json::to_value(stats)?)))
            .collect::<Result<BTreeMap<_, _>, serde_json::Error>>()?;
        let record = TemplateRecord {
            schema_version: schema.version,
            fingerprint: schema.fingerprint,
            trained_at: self.trained_at,
            sample_count: self.sample_count,
            features,
            training_ids: self.training_ids.clone(),
            calibration: self.calibration.clone(),
        };
        Ok(serde_json::to_string_pretty(&record)?)
    }

    /// Parses a persisted record. The catalog version and fingerprint must
    /// match; individual features that are unknown or malformed are dropped
    /// and listed in `skipped_features`.
    pub fn from_json_str(raw: &str) -> Result<Self, TemplateError> {
        let record: TemplateRecord = serde_json::from_str(raw)?;
        assert_schema_compatible(record.schema_version, &record.fingerprint, &feature_schema())?;

        let mut features = BTreeMap::new();
        let mut skipped_features = Vec::new();
        for (key, value) in record.features {
            let Some(name) = FeatureName::parse(&key) else {
                skipped_features.push(SkippedFeature {
                    key,
                    reason: "unknown feature".to_string(),
                });
                continue;
            };
            let parsed = serde_json::from_value::<RawStats>(value)
                .map_err(|err| err.to_string())
                .and_then(RawStats::into_stats);
            match parsed {
                Ok(stats) => {
                    features.insert(name, stats);
                }
                Err(reason) => skipped_features.push(SkippedFeature { key, reason }),
            }
        }

        for skipped in &skipped_features {
            warn!(
                component = "template",
                event = "template.feature.skipped",
                feature = %skipped.key,
                reason = %skipped.reason
            );
        }

        Ok(Self {
            trained_at: record.trained_at,
            sample_count: record.sample_count,
            features,
            training_ids: record.training_ids,
            calibration: record.calibration,
            skipped_features,
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<(), TemplateError> {
        let body = self.to_json_string()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        write_atomic(path, body.as_bytes())?;
        info!(
            component = "template",
            event = "template.saved",
            path = %path.display(),
            feature_count = self.features.len(),
            sample_count = self.sample_count
        );
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, TemplateError> {
        let raw = fs::read_to_string(path)?;
        let template = Self::from_json_str(&raw)?;
        info!(
            component = "template",
            event = "template.loaded",
            path = %path.display(),
            feature_count = template.features.len(),
            skipped_count = template.skipped_features.len()
        );
        Ok(template)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TemplateError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid template path: {}", path.display()),
            )
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
