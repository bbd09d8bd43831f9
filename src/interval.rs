//! Max-gain interval search over an OHLCV series.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::series::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub max_window_periods: usize,
    pub min_gain_percent: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            max_window_periods: 8,
            min_gain_percent: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainInterval {
    pub start_index: usize,
    pub end_index: usize,
    pub start_price: f64,
    pub end_price: f64,
    pub max_price_in_window: f64,
    pub gain_percent: f64,
    pub period_count: usize,
}

/// No window met the gain threshold. Carries the best window seen, if any,
/// so the caller can decide whether to fall back to it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no interval reached the minimum gain (best gain: {best_gain_percent:?})")]
pub struct NoQualifyingInterval {
    pub best_gain_percent: Option<f64>,
    pub best: Option<GainInterval>,
}

/// Finds the window `[s, e]` with `e - s <= max_window_periods` whose gain
/// `(max high over [s, e] - close[s]) / close[s]` is globally maximal.
///
/// Ties keep the earliest start, then the shortest window.
pub fn find_max_gain_interval(
    bars: &[Bar],
    max_window_periods: usize,
    min_gain_percent: f64,
) -> Result<GainInterval, NoQualifyingInterval> {
    let mut best: Option<GainInterval> = None;

    if bars.len() >= 2 && max_window_periods > 0 {
        for s in 0..bars.len() - 1 {
            let start_price = bars[s].close;
            if start_price <= 0.0 {
                continue;
            }
            let last = (s + max_window_periods).min(bars.len() - 1);
            let mut window_high = bars[s].high;
            for (e, bar) in bars.iter().enumerate().take(last + 1).skip(s + 1) {
                window_high = window_high.max(bar.high);
                let gain_percent = (window_high - start_price) / start_price * 100.0;
                let improves = best
                    .map(|current| gain_percent > current.gain_percent)
                    .unwrap_or(true);
                if improves {
                    best = Some(GainInterval {
                        start_index: s,
                        end_index: e,
                        start_price,
                        end_price: bar.close,
                        max_price_in_window: window_high,
                        gain_percent,
                        period_count: e - s + 1,
                    });
                }
            }
        }
    }

    match best {
        Some(interval) if interval.gain_percent >= min_gain_percent => {
            debug!(
                component = "interval",
                event = "interval.found",
                start_index = interval.start_index,
                end_index = interval.end_index,
                gain_percent = interval.gain_percent
            );
            Ok(interval)
        }
        other => Err(NoQualifyingInterval {
            best_gain_percent: other.map(|interval| interval.gain_percent),
            best: other,
        }),
    }
}
