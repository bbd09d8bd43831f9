//! Glue between the engine stages: anchor location, sample building and
//! historical buy-point search.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::features::{extract_features, FeatureMeta, FeatureVector};
use crate::interval::{find_max_gain_interval, GainInterval, NoQualifyingInterval};
use crate::scorer::score;
use crate::series::{Bar, Period, PriceSeries, PriceSeriesProvider, SeriesError};
use crate::surge::find_volume_surge_point;
use crate::template::FeatureTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    VolumeSurge,
    Fallback,
    /// Live scans score the most recent bar as-is.
    LatestBar,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingAnchor {
    pub interval: GainInterval,
    pub anchor_index: usize,
    pub anchor_date: NaiveDate,
    pub source: AnchorSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyPoint {
    pub reference_index: usize,
    pub anchor_index: usize,
    pub anchor_date: NaiveDate,
    pub source: AnchorSource,
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    NoInterval(#[from] NoQualifyingInterval),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// A training code that produced no sample, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: String,
}

/// Anchor for `reference_index`: the strongest volume surge in the lookback,
/// else `reference_index - fallback_offset_periods` clamped at zero.
pub fn resolve_anchor(
    bars: &[Bar],
    reference_index: usize,
    cfg: &EngineConfig,
) -> Result<(usize, AnchorSource), EngineError> {
    let surge = find_volume_surge_point(
        bars,
        reference_index,
        cfg.surge.lookback_periods,
        cfg.surge.min_volume_ratio,
        cfg.surge.baseline,
    );
    match surge {
        Ok(Some(index)) => Ok((index, AnchorSource::VolumeSurge)),
        Ok(None) | Err(EngineError::InsufficientHistory { .. }) => Ok((
            reference_index.saturating_sub(cfg.fallback_offset_periods),
            AnchorSource::Fallback,
        )),
        Err(err) => Err(err),
    }
}

pub fn locate_training_anchor(
    series: &PriceSeries,
    cfg: &EngineConfig,
) -> Result<TrainingAnchor, PipelineError> {
    let interval = find_max_gain_interval(
        &series.bars,
        cfg.interval.max_window_periods,
        cfg.interval.min_gain_percent,
    )?;
    let (anchor_index, source) = resolve_anchor(&series.bars, interval.start_index, cfg)?;

    debug!(
        component = "pipeline",
        event = "pipeline.anchor.located",
        code = %series.code,
        interval_start = interval.start_index,
        gain_percent = interval.gain_percent,
        anchor_index,
        source = ?source
    );

    Ok(TrainingAnchor {
        interval,
        anchor_index,
        anchor_date: series.bars[anchor_index].date,
        source,
    })
}

pub fn build_training_sample(
    series: &PriceSeries,
    cfg: &EngineConfig,
) -> Result<(TrainingAnchor, FeatureVector), PipelineError> {
    let anchor = locate_training_anchor(series, cfg)?;
    let extraction = cfg.extraction.for_code(&series.code);
    let features = extract_features(&series.bars, anchor.anchor_index, &extraction)?;
    let features = features.with_meta(FeatureMeta {
        code: Some(series.code.clone()),
        anchor_date: Some(anchor.anchor_date),
        anchor_index: Some(anchor.anchor_index),
    });
    Ok((anchor, features))
}

/// Fetches each code and builds its training sample. Codes that fail any
/// stage are reported, not fatal.
pub fn collect_training_samples<P: PriceSeriesProvider + ?Sized>(
    provider: &P,
    codes: &[String],
    period: Period,
    cfg: &EngineConfig,
) -> (Vec<FeatureVector>, Vec<SkippedCode>) {
    let mut samples = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let outcome = provider
            .get_price_series(code, period, None)
            .map_err(PipelineError::from)
            .and_then(|series| build_training_sample(&series, cfg));
        match outcome {
            Ok((_, features)) => samples.push(features),
            Err(err) => {
                warn!(
                    component = "pipeline",
                    event = "pipeline.sample.skipped",
                    code = %code,
                    error = %err
                );
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        component = "pipeline",
        event = "pipeline.samples.collected",
        requested = codes.len(),
        collected = samples.len(),
        skipped = skipped.len()
    );

    (samples, skipped)
}

/// Every reference index with enough history is anchored the same way
/// training anchors are, and the anchor is scored once. Points scoring at
/// least `threshold` are returned in series order.
pub fn find_buy_points(
    series: &PriceSeries,
    template: &FeatureTemplate,
    cfg: &EngineConfig,
    threshold: f64,
) -> Vec<BuyPoint> {
    let extraction = cfg.extraction.for_code(&series.code);
    let mut seen = BTreeSet::new();
    let mut points = Vec::new();

    for reference_index in cfg.extraction.lookback_periods..series.bars.len() {
        let Ok((anchor_index, source)) = resolve_anchor(&series.bars, reference_index, cfg) else {
            continue;
        };
        if !seen.insert(anchor_index) {
            continue;
        }
        let Ok(features) = extract_features(&series.bars, anchor_index, &extraction) else {
            continue;
        };
        let result = score(&features, template, &cfg.scoring);
        if result.total_score >= threshold {
            points.push(BuyPoint {
                reference_index,
                anchor_index,
                anchor_date: series.bars[anchor_index].date,
                source,
                score: result.total_score,
            });
        }
    }

    points.sort_by_key(|point| point.anchor_index);

    debug!(
        component = "pipeline",
        event = "pipeline.buy_points.found",
        code = %series.code,
        count = points.len(),
        threshold
    );

    points
}
