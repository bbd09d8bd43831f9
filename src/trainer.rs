//! Template training: aggregation plus a bounded self-calibration loop.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::features::{FeatureName, FeatureVector};
use crate::indicators;
use crate::scorer::{score, ScoringConfig};
use crate::template::{
    CalibrationStatus, CalibrationSummary, FeatureStats, FeatureTemplate, TemplateError,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub target_min_match: f64,
    pub max_iterations: usize,
    pub std_expand_factor: f64,
    pub range_expand_factor: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_min_match: 0.95,
            max_iterations: 25,
            std_expand_factor: 1.3,
            range_expand_factor: 1.2,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.target_min_match) {
            return Err(EngineError::InvalidConfig(
                "target_min_match must be within [0, 1]".to_string(),
            ));
        }
        if self.std_expand_factor <= 1.0 || self.range_expand_factor < 1.0 {
            return Err(EngineError::InvalidConfig(
                "std_expand_factor must be > 1 and range_expand_factor >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleScore {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub template: FeatureTemplate,
    pub status: CalibrationStatus,
    /// Widening passes applied.
    pub iterations: usize,
    /// Minimum self-match before the first pass and after each pass.
    pub min_score_history: Vec<f64>,
    pub sample_scores: Vec<SampleScore>,
}

/// Per-feature statistics over the vectors that define each feature.
/// Standard deviation is the population form.
pub fn aggregate(vectors: &[FeatureVector]) -> BTreeMap<FeatureName, FeatureStats> {
    let mut columns: BTreeMap<FeatureName, Vec<f64>> = BTreeMap::new();
    for vector in vectors {
        for (name, value) in vector.iter() {
            columns.entry(name).or_default().push(value);
        }
    }

    columns
        .into_iter()
        .filter_map(|(name, values)| {
            let min = indicators::min(&values)?;
            let max = indicators::max(&values)?;
            // Identical values get an exact zero spread, not summation noise.
            let (mean, std_dev) = if min == max {
                (min, 0.0)
            } else {
                (indicators::mean(&values)?, indicators::population_std(&values)?)
            };
            let stats = FeatureStats {
                mean,
                median: indicators::median(&values)?,
                std_dev,
                min,
                max,
                sample_count: values.len(),
            };
            Some((name, stats))
        })
        .collect()
}

/// Builds a template from labeled samples and widens it until every sample
/// scores at least `target_min_match` against it, or the iteration budget
/// runs out. Widening never moves a mean, so no sample's score can drop
/// between passes.
pub fn train(
    vectors: &[FeatureVector],
    cfg: &TrainingConfig,
    scoring: &ScoringConfig,
) -> Result<TrainingReport, TemplateError> {
    if vectors.is_empty() {
        return Err(TemplateError::EmptyTrainingSet);
    }

    let training_ids: Vec<String> = vectors.iter().map(FeatureVector::label).collect();
    let mut template =
        FeatureTemplate::new(aggregate(vectors), vectors.len(), training_ids.clone());

    info!(
        component = "trainer",
        event = "trainer.start",
        sample_count = vectors.len(),
        feature_count = template.features.len(),
        target_min_match = cfg.target_min_match,
        max_iterations = cfg.max_iterations
    );

    let mut history = Vec::new();
    let mut iterations = 0;
    let mut sample_scores;
    loop {
        sample_scores = self_scores(vectors, &training_ids, &template, scoring);
        let min_score = min_of(&sample_scores);
        history.push(min_score);

        if min_score >= cfg.target_min_match || iterations >= cfg.max_iterations {
            break;
        }

        let targets = widening_targets(vectors, &template, cfg, scoring);
        if targets.is_empty() {
            // A failing sample with no scorable features cannot be fixed by widening.
            debug!(
                component = "trainer",
                event = "trainer.calibration.stalled",
                iteration = iterations,
                min_score
            );
            break;
        }

        for name in &targets {
            if let Some(stats) = template.features.get_mut(name) {
                widen(stats, cfg);
            }
        }
        iterations += 1;

        debug!(
            component = "trainer",
            event = "trainer.calibration.iteration",
            iteration = iterations,
            widened = targets.len(),
            min_score_before = min_score
        );
    }

    let min_self_match = history.last().copied().unwrap_or(0.0);
    let failing: Vec<String> = sample_scores
        .iter()
        .filter(|sample| sample.score < cfg.target_min_match)
        .map(|sample| sample.id.clone())
        .collect();
    let status = if failing.is_empty() {
        CalibrationStatus::Converged
    } else {
        CalibrationStatus::MaxIterationsExceeded {
            failing_samples: failing,
        }
    };

    template.calibration = Some(CalibrationSummary {
        status: status.clone(),
        iterations,
        target_min_match: cfg.target_min_match,
        min_self_match,
    });

    match &status {
        CalibrationStatus::Converged => info!(
            component = "trainer",
            event = "trainer.finish",
            status = "converged",
            iterations,
            min_self_match
        ),
        CalibrationStatus::MaxIterationsExceeded { failing_samples } => warn!(
            component = "trainer",
            event = "trainer.finish",
            status = "max_iterations_exceeded",
            iterations,
            min_self_match,
            failing_count = failing_samples.len()
        ),
    }

    Ok(TrainingReport {
        template,
        status,
        iterations,
        min_score_history: history,
        sample_scores,
    })
}

fn self_scores(
    vectors: &[FeatureVector],
    ids: &[String],
    template: &FeatureTemplate,
    scoring: &ScoringConfig,
) -> Vec<SampleScore> {
    vectors
        .iter()
        .zip(ids)
        .map(|(vector, id)| SampleScore {
            id: id.clone(),
            score: score(vector, template, scoring).total_score,
        })
        .collect()
}

fn min_of(scores: &[SampleScore]) -> f64 {
    scores
        .iter()
        .map(|sample| sample.score)
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Features on which at least one failing sample scores below target.
fn widening_targets(
    vectors: &[FeatureVector],
    template: &FeatureTemplate,
    cfg: &TrainingConfig,
    scoring: &ScoringConfig,
) -> BTreeSet<FeatureName> {
    let mut targets = BTreeSet::new();
    for vector in vectors {
        let result = score(vector, template, scoring);
        if result.total_score >= cfg.target_min_match {
            continue;
        }
        for (name, feature) in &result.per_feature {
            if feature.score < cfg.target_min_match {
                targets.insert(*name);
            }
        }
    }
    targets
}

/// Scales spread and range outward; the centre stays fixed so
/// `min <= median <= max` holds after every pass.
fn widen(stats: &mut FeatureStats, cfg: &TrainingConfig) {
    stats.std_dev *= cfg.std_expand_factor;
    stats.min = stats.median - (stats.median - stats.min) * cfg.range_expand_factor;
    stats.max = stats.median + (stats.max - stats.median) * cfg.range_expand_factor;
}
