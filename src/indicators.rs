//! Slice-based indicator math used by the feature extractor.
//!
//! Every function looks only at the slice it is given, so callers control
//! the window and nothing past the anchor can leak in.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

/// Sample standard deviation (divides by `n - 1`).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// The trailing `n` values, or `None` when the slice is shorter.
pub fn tail(values: &[f64], n: usize) -> Option<&[f64]> {
    if n == 0 || values.len() < n {
        return None;
    }
    Some(&values[values.len() - n..])
}

pub fn sma_last(values: &[f64], n: usize) -> Option<f64> {
    mean(tail(values, n)?)
}

/// Simple period-over-period returns; entries with a zero base are dropped.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect()
}

/// Exponential moving average seeded with the first value, `alpha = 2 / (span + 1)`.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = None;
    for value in values {
        let next = match prev {
            Some(p) => alpha * value + (1.0 - alpha) * p,
            None => *value,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub dif: f64,
    pub dea: f64,
    pub histogram: f64,
    pub prev_dif: f64,
    pub prev_dea: f64,
}

impl Macd {
    pub fn golden_cross(&self) -> bool {
        self.prev_dif - self.prev_dea < 0.0 && self.dif - self.dea >= 0.0
    }
}

/// MACD(12, 26, 9) at the last value. Needs at least 26 closes.
pub fn macd(closes: &[f64]) -> Option<Macd> {
    if closes.len() < 26 {
        return None;
    }
    let ema12 = ema_series(closes, 12);
    let ema26 = ema_series(closes, 26);
    let dif: Vec<f64> = ema12.iter().zip(&ema26).map(|(a, b)| a - b).collect();
    let dea = ema_series(&dif, 9);
    let last = dif.len() - 1;
    Some(Macd {
        dif: dif[last],
        dea: dea[last],
        histogram: (dif[last] - dea[last]) * 2.0,
        prev_dif: dif[last - 1],
        prev_dea: dea[last - 1],
    })
}

/// RSI using simple averages of gains and losses over `period` changes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let window = &closes[closes.len() - period - 1..];
    let mut gain = 0.0;
    let mut loss = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain += delta;
        } else {
            loss -= delta;
        }
    }
    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;
    let rs = avg_gain / (avg_loss + 1e-4);
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kdj {
    pub k: f64,
    pub d: f64,
    pub j: f64,
}

/// KDJ(9, 3, 3) with K and D seeded at 50.
pub fn kdj(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<Kdj> {
    let len = closes.len();
    if period == 0 || len < period || highs.len() != len || lows.len() != len {
        return None;
    }
    let mut k = 50.0;
    let mut d = 50.0;
    for end in period..=len {
        let start = end - period;
        let high = max(&highs[start..end])?;
        let low = min(&lows[start..end])?;
        let rsv = (closes[end - 1] - low) / (high - low + 1e-4) * 100.0;
        k = 2.0 / 3.0 * k + 1.0 / 3.0 * rsv;
        d = 2.0 / 3.0 * d + 1.0 / 3.0 * k;
    }
    Some(Kdj {
        k,
        d,
        j: 3.0 * k - 2.0 * d,
    })
}

/// On-balance volume, starting at zero on the first bar.
pub fn obv_series(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(0.0);
    for i in 1..closes.len().min(volumes.len()) {
        let prev = out[i - 1];
        let next = if closes[i] > closes[i - 1] {
            prev + volumes[i]
        } else if closes[i] < closes[i - 1] {
            prev - volumes[i]
        } else {
            prev
        };
        out.push(next);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

impl Bollinger {
    /// Band width as a percentage of the middle band.
    pub fn width_pct(&self) -> Option<f64> {
        if self.middle > 0.0 {
            Some((self.upper - self.lower) / self.middle * 100.0)
        } else {
            None
        }
    }
}

/// Bollinger bands over the `period` values ending at `end` (exclusive).
pub fn bollinger_at(closes: &[f64], end: usize, period: usize, k: f64) -> Option<Bollinger> {
    if end > closes.len() || end < period {
        return None;
    }
    let window = &closes[end - period..end];
    let middle = mean(window)?;
    let std = sample_std(window)?;
    Some(Bollinger {
        middle,
        upper: middle + k * std,
        lower: middle - k * std,
    })
}

/// Pearson correlation, `None` when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (x, y) = (&x[x.len() - n..], &y[y.len() - n..]);
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx) * (a - mx);
        vy += (b - my) * (b - my);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// Smallest value whose cumulative weight reaches `q` of the total.
pub fn weighted_percentile(values: &[f64], weights: &[f64], q: f64) -> Option<f64> {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .filter(|(_, w)| *w > 0.0)
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let target = q.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;
    for (value, weight) in &pairs {
        cumulative += weight;
        if cumulative >= target {
            return Some(*value);
        }
    }
    pairs.last().map(|(value, _)| *value)
}

/// Number of sign changes in the period-over-period direction of a series.
pub fn direction_flips(values: &[f64]) -> usize {
    let signs: Vec<i8> = values
        .windows(2)
        .map(|pair| {
            let d = pair[1] - pair[0];
            if d > 0.0 {
                1
            } else if d < 0.0 {
                -1
            } else {
                0
            }
        })
        .collect();
    signs.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

/// Rolling simple moving average series, one value per full window.
pub fn sma_series(values: &[f64], n: usize) -> Vec<f64> {
    if n == 0 || values.len() < n {
        return Vec::new();
    }
    values
        .windows(n)
        .map(|w| w.iter().sum::<f64>() / n as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "actual={actual} expected={expected}"
        );
    }

    #[test]
    fn basic_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_close(mean(&values).unwrap(), 5.0);
        assert_close(population_std(&values).unwrap(), 2.0);
        assert_close(median(&values).unwrap(), 4.5);
        assert_close(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert!(mean(&[]).is_none());
        assert!(sample_std(&[1.0]).is_none());
        assert_eq!(tail(&values, 3), Some(&[5.0, 7.0, 9.0][..]));
        assert!(tail(&values, 9).is_none());
    }

    #[test]
    fn ema_is_seeded_with_first_value() {
        let ema = ema_series(&[10.0, 20.0], 3);
        assert_close(ema[0], 10.0);
        assert_close(ema[1], 15.0);
    }

    #[test]
    fn macd_of_flat_series_is_zero_and_needs_history() {
        assert!(macd(&[1.0; 25]).is_none());
        let flat = macd(&[5.0; 30]).unwrap();
        assert_close(flat.dif, 0.0);
        assert_close(flat.histogram, 0.0);
        assert!(!flat.golden_cross());
    }

    #[test]
    fn rsi_saturates_on_monotone_rise() {
        let rising: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        assert!(rsi(&rising, 14).unwrap() > 99.0);
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert!(rsi(&falling, 14).unwrap() < 1.0);
        assert!(rsi(&rising[..14], 14).is_none());
    }

    #[test]
    fn obv_accumulates_signed_volume() {
        let obv = obv_series(&[1.0, 2.0, 2.0, 1.0], &[10.0, 20.0, 30.0, 5.0]);
        assert_eq!(obv, vec![0.0, 20.0, 20.0, 15.0]);
    }

    #[test]
    fn pearson_detects_perfect_correlation() {
        assert_close(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap(), 1.0);
        assert_close(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]).unwrap(), -1.0);
        assert!(pearson(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn weighted_percentile_walks_cumulative_weight() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let weights = [1.0, 1.0, 1.0, 1.0];
        assert_close(weighted_percentile(&values, &weights, 0.05).unwrap(), 1.0);
        assert_close(weighted_percentile(&values, &weights, 0.5).unwrap(), 2.0);
        assert_close(weighted_percentile(&values, &weights, 0.95).unwrap(), 4.0);
        assert!(weighted_percentile(&values, &[0.0; 4], 0.5).is_none());
    }

    #[test]
    fn direction_flips_counts_turns() {
        assert_eq!(direction_flips(&[1.0, 2.0, 3.0, 4.0]), 0);
        assert_eq!(direction_flips(&[1.0, 2.0, 1.0, 2.0]), 2);
    }

    #[test]
    fn bollinger_and_kdj_shapes() {
        let closes: Vec<f64> = (0..20).map(|i| 10.0 + (i % 2) as f64).collect();
        let bands = bollinger_at(&closes, 20, 20, 2.0).unwrap();
        assert!(bands.upper > bands.middle && bands.middle > bands.lower);
        assert!(bands.width_pct().unwrap() > 0.0);
        assert!(bollinger_at(&closes, 10, 20, 2.0).is_none());

        let highs: Vec<f64> = closes.iter().map(|c| c + 0.5).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 0.5).collect();
        let kdj = kdj(&highs, &lows, &closes, 9).unwrap();
        assert!((0.0..=100.0).contains(&kdj.k));
        assert_close(kdj.j, 3.0 * kdj.k - 2.0 * kdj.d);
    }

    #[test]
    fn sma_series_has_one_value_per_window() {
        assert_eq!(sma_series(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(sma_series(&[1.0], 2).is_empty());
    }
}
