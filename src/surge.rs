//! Volume ignition search ahead of a reference bar.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::indicators;
use crate::series::Bar;

/// Baseline a bar's volume is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VolumeBaseline {
    /// Volume of the immediately preceding bar. A single quiet week makes
    /// any ordinary week look like a surge against it.
    PreviousBar,
    /// Median volume of the `periods` bars before the candidate.
    TrailingMedian { periods: usize },
}

impl VolumeBaseline {
    fn required_history(self) -> usize {
        match self {
            Self::PreviousBar => 1,
            Self::TrailingMedian { periods } => periods.max(1),
        }
    }

    fn value(self, bars: &[Bar], index: usize) -> Option<f64> {
        let need = self.required_history();
        if index < need {
            return None;
        }
        match self {
            Self::PreviousBar => Some(bars[index - 1].volume),
            Self::TrailingMedian { .. } => {
                let volumes: Vec<f64> =
                    bars[index - need..index].iter().map(|b| b.volume).collect();
                indicators::median(&volumes)
            }
        }
    }
}

/// Defaults to a 10-bar trailing median baseline; set `baseline` to
/// `previous_bar` for week-over-week ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeConfig {
    pub lookback_periods: usize,
    pub min_volume_ratio: f64,
    pub baseline: VolumeBaseline,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            lookback_periods: 52,
            min_volume_ratio: 3.0,
            baseline: VolumeBaseline::TrailingMedian { periods: 10 },
        }
    }
}

/// Bar in `[reference_index - lookback_periods, reference_index]` with the
/// largest volume-to-baseline ratio, provided that ratio clears
/// `min_volume_ratio`. Equal ratios resolve to the earlier bar.
///
/// Returns `Ok(None)` when no bar clears the threshold and
/// `InsufficientHistory` when no bar in range has a full baseline window.
pub fn find_volume_surge_point(
    bars: &[Bar],
    reference_index: usize,
    lookback_periods: usize,
    min_volume_ratio: f64,
    baseline: VolumeBaseline,
) -> Result<Option<usize>, EngineError> {
    if reference_index >= bars.len() {
        return Err(EngineError::AnchorOutOfRange {
            anchor_index: reference_index,
            len: bars.len(),
        });
    }

    let need = baseline.required_history();
    let first = reference_index.saturating_sub(lookback_periods).max(need);
    if first > reference_index {
        return Err(EngineError::InsufficientHistory {
            required: need + 1,
            available: reference_index + 1,
        });
    }

    let mut best: Option<(usize, f64)> = None;
    for index in first..=reference_index {
        let Some(base) = baseline.value(bars, index) else {
            continue;
        };
        if base <= 0.0 {
            continue;
        }
        let ratio = bars[index].volume / base;
        if ratio < min_volume_ratio {
            continue;
        }
        if best.map(|(_, r)| ratio > r).unwrap_or(true) {
            best = Some((index, ratio));
        }
    }

    if let Some((index, ratio)) = best {
        debug!(
            component = "surge",
            event = "surge.found",
            reference_index,
            surge_index = index,
            volume_ratio = ratio
        );
    }

    Ok(best.map(|(index, _)| index))
}
