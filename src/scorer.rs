//! Tiered, z-score-decayed match scoring of a feature vector against a template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::features::{FeatureName, FeatureVector};
use crate::template::{FeatureStats, FeatureTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    SuperCore,
    Core,
    Normal,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::SuperCore, Tier::Core, Tier::Normal];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperCore => "super_core",
            Self::Core => "core",
            Self::Normal => "normal",
        }
    }
}

/// Static tier membership. Anything not listed is `Normal`.
pub fn tier_of(name: FeatureName) -> Tier {
    use FeatureName::*;
    match name {
        ProfitChipRatio | RelativePricePosition => Tier::SuperCore,
        CostConcentration90
        | AnchorVolumeRatio
        | VolumeContraction
        | PriceVsMa20
        | Volatility20
        | BelowMaxVolumeLow
        | MaxVolume40
        | DrawdownFromHigh20 => Tier::Core,
        _ => Tier::Normal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub super_core_weight: f64,
    pub core_weight: f64,
    pub normal_weight: f64,
    pub super_core_decay: f64,
    pub core_decay: f64,
    pub normal_decay: f64,
    pub range_bonus: f64,
    pub zero_std_epsilon: f64,
    /// Multiplier for super-core features with `z > 2`.
    pub severe_outlier_penalty: f64,
    /// Multiplier for super-core features with `1.5 < z <= 2`.
    pub mild_outlier_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            super_core_weight: 6.0,
            core_weight: 4.0,
            normal_weight: 1.0,
            super_core_decay: 0.3,
            core_decay: 0.4,
            normal_decay: 0.5,
            range_bonus: 0.1,
            zero_std_epsilon: 0.01,
            severe_outlier_penalty: 0.5,
            mild_outlier_penalty: 0.7,
        }
    }
}

impl ScoringConfig {
    pub fn weight(&self, tier: Tier) -> f64 {
        match tier {
            Tier::SuperCore => self.super_core_weight,
            Tier::Core => self.core_weight,
            Tier::Normal => self.normal_weight,
        }
    }

    pub fn decay(&self, tier: Tier) -> f64 {
        match tier {
            Tier::SuperCore => self.super_core_decay,
            Tier::Core => self.core_decay,
            Tier::Normal => self.normal_decay,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let non_negative = [
            self.super_core_weight,
            self.core_weight,
            self.normal_weight,
            self.range_bonus,
            self.zero_std_epsilon,
        ];
        if non_negative.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EngineError::InvalidConfig(
                "scoring weights, bonus and epsilon must be finite and >= 0".to_string(),
            ));
        }
        let decays = [self.super_core_decay, self.core_decay, self.normal_decay];
        if decays.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(EngineError::InvalidConfig(
                "scoring decays must be finite and > 0".to_string(),
            ));
        }
        let penalties = [self.severe_outlier_penalty, self.mild_outlier_penalty];
        if penalties.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(EngineError::InvalidConfig(
                "outlier penalties must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub tier: Tier,
    pub value: f64,
    /// `None` when the template has zero spread for this feature.
    pub z: Option<f64>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierAggregate {
    pub count: usize,
    pub average: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub per_feature: BTreeMap<FeatureName, FeatureScore>,
    pub tier_aggregates: BTreeMap<Tier, TierAggregate>,
    pub total_score: f64,
}

/// Score of a single value against its template statistics, in `[0, 1]`.
pub fn feature_score(
    value: f64,
    stats: &FeatureStats,
    tier: Tier,
    cfg: &ScoringConfig,
) -> (f64, Option<f64>) {
    let deviation = (value - stats.mean).abs();
    let (mut score, z) = if stats.std_dev > 0.0 {
        let z = deviation / stats.std_dev;
        // A tiny spread can overflow z; an unbounded distance scores zero.
        let scaled = z * cfg.decay(tier);
        let base = if scaled.is_finite() {
            1.0 / (1.0 + scaled)
        } else {
            0.0
        };
        (base, Some(z))
    } else if deviation < cfg.zero_std_epsilon {
        (1.0, None)
    } else {
        (0.0, None)
    };

    if stats.contains(value) {
        score = (score + cfg.range_bonus).min(1.0);
    }

    if tier == Tier::SuperCore {
        if let Some(z) = z {
            if z > 2.0 {
                score *= cfg.severe_outlier_penalty;
            } else if z > 1.5 {
                score *= cfg.mild_outlier_penalty;
            }
        }
    }

    (score.clamp(0.0, 1.0), z)
}

/// Pure function of `(features, template)`. Features missing on either side
/// are excluded from both numerator and denominator.
pub fn score(
    features: &FeatureVector,
    template: &FeatureTemplate,
    cfg: &ScoringConfig,
) -> MatchResult {
    let mut per_feature = BTreeMap::new();
    let mut sums: BTreeMap<Tier, (f64, usize)> = BTreeMap::new();

    for (name, value) in features.iter() {
        let Some(stats) = template.get(name) else {
            continue;
        };
        let tier = tier_of(name);
        let (value_score, z) = feature_score(value, stats, tier, cfg);
        per_feature.insert(
            name,
            FeatureScore {
                tier,
                value,
                z,
                score: value_score,
            },
        );
        let entry = sums.entry(tier).or_insert((0.0, 0));
        entry.0 += value_score;
        entry.1 += 1;
    }

    let mut tier_aggregates = BTreeMap::new();
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (tier, (sum, count)) in sums {
        let average = sum / count as f64;
        let weight = cfg.weight(tier);
        weighted += average * weight * count as f64;
        total_weight += weight * count as f64;
        tier_aggregates.insert(
            tier,
            TierAggregate {
                count,
                average,
                weight,
            },
        );
    }

    let ratio = weighted / total_weight;
    let total_score = if total_weight > 0.0 && ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };

    MatchResult {
        per_feature,
        tier_aggregates,
        total_score,
    }
}
