//! Bounded concurrent market scan against a shared, frozen template.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::features::{extract_features, FeatureMeta};
use crate::pipeline::AnchorSource;
use crate::scorer::score;
use crate::series::{Period, PriceSeriesProvider};
use crate::template::FeatureTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub period: Period,
    /// Bars after this date are never read.
    pub end_date: Option<NaiveDate>,
    pub threshold: f64,
    pub max_workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            period: Period::Weekly,
            end_date: None,
            threshold: 0.83,
            max_workers: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Matched {
        score: f64,
        anchor_date: NaiveDate,
        source: AnchorSource,
    },
    BelowThreshold {
        score: f64,
        anchor_date: NaiveDate,
        source: AnchorSource,
    },
    Skipped {
        reason: String,
    },
}

impl ScanOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Matched { score, .. } | Self::BelowThreshold { score, .. } => Some(*score),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub code: String,
    pub outcome: ScanOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Sorted by score descending; skipped codes last.
    pub entries: Vec<ScanEntry>,
}

impl ScanReport {
    pub fn matched(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, ScanOutcome::Matched { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, ScanOutcome::Skipped { .. }))
            .count()
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid scan options: {0}")]
    InvalidOptions(String),
}

/// Fetch one code and score the latest bar on or before `end_date`.
pub fn scan_code<P: PriceSeriesProvider + ?Sized>(
    provider: &P,
    code: &str,
    template: &FeatureTemplate,
    cfg: &EngineConfig,
    options: &ScanOptions,
) -> ScanOutcome {
    let series = match provider.get_price_series(code, options.period, options.end_date) {
        Ok(series) => series,
        Err(err) => return skipped(err),
    };
    let Some(anchor_index) = series.len().checked_sub(1) else {
        return skipped("empty series");
    };
    let source = AnchorSource::LatestBar;
    let extraction = cfg.extraction.for_code(code);
    let features = match extract_features(&series.bars, anchor_index, &extraction) {
        Ok(features) => features.with_meta(FeatureMeta {
            code: Some(series.code.clone()),
            anchor_date: Some(series.bars[anchor_index].date),
            anchor_index: Some(anchor_index),
        }),
        Err(err) => return skipped(err),
    };

    let total = score(&features, template, &cfg.scoring).total_score;
    let anchor_date = series.bars[anchor_index].date;
    debug!(
        component = "scan",
        event = "scan.code.scored",
        code,
        anchor_date = %anchor_date,
        score = total
    );

    if total >= options.threshold {
        ScanOutcome::Matched {
            score: total,
            anchor_date,
            source,
        }
    } else {
        ScanOutcome::BelowThreshold {
            score: total,
            anchor_date,
            source,
        }
    }
}

fn skipped(err: impl std::fmt::Display) -> ScanOutcome {
    ScanOutcome::Skipped {
        reason: err.to_string(),
    }
}

/// Scans `codes` with at most `max_workers` units in flight. Each unit runs
/// on the blocking pool; the template is shared read-only.
pub async fn scan_codes<P>(
    provider: Arc<P>,
    codes: Vec<String>,
    template: Arc<FeatureTemplate>,
    cfg: Arc<EngineConfig>,
    options: ScanOptions,
) -> Result<ScanReport, ScanError>
where
    P: PriceSeriesProvider + ?Sized + 'static,
{
    if options.max_workers == 0 {
        return Err(ScanError::InvalidOptions("max_workers must be > 0".to_string()));
    }
    if !(0.0..=1.0).contains(&options.threshold) {
        return Err(ScanError::InvalidOptions(
            "threshold must be within [0, 1]".to_string(),
        ));
    }

    info!(
        component = "scan",
        event = "scan.start",
        code_count = codes.len(),
        max_workers = options.max_workers,
        threshold = options.threshold,
        period = options.period.as_str()
    );

    let semaphore = Arc::new(Semaphore::new(options.max_workers));
    let mut join_set: JoinSet<ScanEntry> = JoinSet::new();

    for code in codes {
        let semaphore = Arc::clone(&semaphore);
        let provider = Arc::clone(&provider);
        let template = Arc::clone(&template);
        let cfg = Arc::clone(&cfg);

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    return ScanEntry {
                        code,
                        outcome: skipped(err),
                    }
                }
            };
            let worker_code = code.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                scan_code(provider.as_ref(), &worker_code, &template, &cfg, &options)
            })
            .await
            .unwrap_or_else(|err| skipped(format!("scan worker failed: {err}")));
            ScanEntry { code, outcome }
        });
    }

    let mut entries = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(
                component = "scan",
                event = "scan.task.failed",
                error = %err
            ),
        }
    }

    entries.sort_by(|a, b| match (a.outcome.score(), b.outcome.score()) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.code.cmp(&b.code)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.code.cmp(&b.code),
    });

    let report = ScanReport { entries };
    info!(
        component = "scan",
        event = "scan.finish",
        scanned = report.entries.len(),
        matched = report.matched().count(),
        skipped = report.skipped_count()
    );

    Ok(report)
}
