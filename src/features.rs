//! Anchor-window feature extraction and the closed feature catalog.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::indicators::{self, tail};
use crate::series::{Bar, Board};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const MIN_LOOKBACK_PERIODS: usize = 20;

macro_rules! feature_catalog {
    ($($variant:ident => $key:literal,)+) => {
        /// Every feature the extractor can emit. Adding or renaming one is a
        /// schema change and must bump `FEATURE_SCHEMA_VERSION`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum FeatureName {
            $($variant,)+
        }

        impl FeatureName {
            pub const ALL: &'static [FeatureName] = &[$(FeatureName::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(FeatureName::$variant => $key,)+
                }
            }

            pub fn parse(key: &str) -> Option<Self> {
                match key {
                    $($key => Some(FeatureName::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

feature_catalog! {
    AnchorVolumeRatio => "anchor_volume_ratio",
    AvgVolume10 => "avg_volume_10",
    AvgVolume20 => "avg_volume_20",
    AvgVolume40 => "avg_volume_40",
    VolumeContraction => "volume_contraction",
    MaxVolume40 => "max_volume_40",
    MaxVolumeBarLow => "max_volume_bar_low",
    BelowMaxVolumeLow => "below_max_volume_low",
    DropBelowMaxVolumeLowPct => "drop_below_max_volume_low_pct",
    AnchorVolumeToMax => "anchor_volume_to_max",
    RelativePricePosition => "relative_price_position",
    DrawdownFromHigh20 => "drawdown_from_high_20",
    High20 => "high_20",
    Low20 => "low_20",
    High40 => "high_40",
    Low40 => "low_40",
    PriceRange20Pct => "price_range_20_pct",
    AnchorPrice => "anchor_price",
    PriceVsMa5 => "price_vs_ma5",
    PriceVsMa10 => "price_vs_ma10",
    PriceVsMa20 => "price_vs_ma20",
    PriceVsMa40 => "price_vs_ma40",
    Ma20Slope => "ma20_slope",
    MaConvergence => "ma_convergence",
    MaBullishStack => "ma_bullish_stack",
    MaSmoothness => "ma_smoothness",
    PriceVolumeCorrelation20 => "price_volume_correlation_20",
    AnchorPriceUp => "anchor_price_up",
    AnchorVolumeUp => "anchor_volume_up",
    AnchorPriceVolumeUp => "anchor_price_volume_up",
    Volatility10 => "volatility_10",
    Volatility20 => "volatility_20",
    ReturnStd10 => "return_std_10",
    ReturnStd20 => "return_std_20",
    MacdDif => "macd_dif",
    MacdDea => "macd_dea",
    MacdHistogram => "macd_histogram",
    MacdGoldenCross => "macd_golden_cross",
    MacdAboveZero => "macd_above_zero",
    Rsi => "rsi",
    RsiOversold => "rsi_oversold",
    RsiStrongZone => "rsi_strong_zone",
    KdjK => "kdj_k",
    KdjD => "kdj_d",
    KdjJ => "kdj_j",
    KdjOversold => "kdj_oversold",
    ObvTrend => "obv_trend",
    ObvNearHigh => "obv_near_high",
    BollingerWidth => "bollinger_width",
    BollingerPosition => "bollinger_position",
    BollingerSqueeze => "bollinger_squeeze",
    CostDeviation => "cost_deviation",
    ChipConcentration => "chip_concentration",
    ProfitChipRatio => "profit_chip_ratio",
    CostConcentration90 => "cost_concentration_90",
    BreakoutHigh20 => "breakout_high_20",
    NearHigh20 => "near_high_20",
    BreakoutHigh40 => "breakout_high_40",
    ConsolidationPeriods => "consolidation_periods",
    RecentLimitUp => "recent_limit_up",
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FeatureName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FeatureName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        FeatureName::parse(&key)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown feature: {key}")))
    }
}

/// Out-of-band identifiers carried alongside a vector; never aggregated or scored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMeta {
    pub code: Option<String>,
    pub anchor_date: Option<NaiveDate>,
    pub anchor_index: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub meta: FeatureMeta,
    values: BTreeMap<FeatureName, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meta(mut self, meta: FeatureMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Stores `value` unless it is NaN or infinite.
    pub fn insert(&mut self, name: FeatureName, value: f64) {
        if value.is_finite() {
            self.values.insert(name, value);
        }
    }

    fn flag(&mut self, name: FeatureName, on: bool) {
        self.insert(name, if on { 1.0 } else { 0.0 });
    }

    pub fn remove(&mut self, name: FeatureName) -> Option<f64> {
        self.values.remove(&name)
    }

    pub fn get(&self, name: FeatureName) -> Option<f64> {
        self.values.get(&name).copied()
    }

    pub fn contains(&self, name: FeatureName) -> bool {
        self.values.contains_key(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Label used in logs and reports: the stock code if known.
    pub fn label(&self) -> String {
        match (&self.meta.code, self.meta.anchor_date) {
            (Some(code), Some(date)) => format!("{code}@{date}"),
            (Some(code), None) => code.clone(),
            (None, Some(date)) => date.to_string(),
            (None, None) => "unlabeled".to_string(),
        }
    }
}

impl FromIterator<(FeatureName, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (FeatureName, f64)>>(iter: I) -> Self {
        let mut vector = FeatureVector::new();
        for (name, value) in iter {
            vector.insert(name, value);
        }
        vector
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub lookback_periods: usize,
    /// Daily price limit of the board, in percent.
    pub limit_up_pct: f64,
    /// Bars before the anchor searched for a limit-up move. The check is
    /// close-to-close per bar, so on weekly bars it flags a week that gained
    /// at least the daily limit, a proxy for a limit-up day in that week.
    pub limit_up_window: usize,
    /// A bar whose high/low range stays under this percentage counts as consolidation.
    pub consolidation_range_pct: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            lookback_periods: 40,
            limit_up_pct: 10.0,
            limit_up_window: 8,
            consolidation_range_pct: 10.0,
        }
    }
}

impl ExtractionConfig {
    /// Copy with the daily limit of the board `code` is listed on.
    pub fn for_code(&self, code: &str) -> Self {
        Self {
            limit_up_pct: Board::from_code(code).limit_up_pct(),
            ..*self
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.lookback_periods < MIN_LOOKBACK_PERIODS {
            return Err(EngineError::InvalidConfig(format!(
                "lookback_periods must be >= {MIN_LOOKBACK_PERIODS}"
            )));
        }
        if self.limit_up_pct <= 0.0 || self.limit_up_window == 0 {
            return Err(EngineError::InvalidConfig(
                "limit_up_pct and limit_up_window must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Computes the feature vector for the window of `lookback_periods` bars
/// strictly before `anchor_index` plus the anchor bar itself.
///
/// Bars after the anchor are never read.
pub fn extract_features(
    bars: &[Bar],
    anchor_index: usize,
    cfg: &ExtractionConfig,
) -> Result<FeatureVector, EngineError> {
    cfg.validate()?;
    if anchor_index >= bars.len() {
        return Err(EngineError::AnchorOutOfRange {
            anchor_index,
            len: bars.len(),
        });
    }
    if anchor_index < cfg.lookback_periods {
        return Err(EngineError::InsufficientHistory {
            required: cfg.lookback_periods + 1,
            available: anchor_index + 1,
        });
    }

    let window = Window::new(
        &bars[anchor_index - cfg.lookback_periods..anchor_index],
        bars[anchor_index],
    );
    let mut out = FeatureVector::new().with_meta(FeatureMeta {
        code: None,
        anchor_date: Some(window.anchor.date),
        anchor_index: Some(anchor_index),
    });

    volume_features(&window, &mut out);
    price_features(&window, &mut out);
    moving_average_features(&window, &mut out);
    volume_price_features(&window, &mut out);
    volatility_features(&window, &mut out);
    oscillator_features(&window, &mut out);
    bollinger_features(&window, &mut out);
    chip_features(&window, &mut out);
    structure_features(&window, cfg, &mut out);

    debug!(
        component = "features",
        event = "features.extract.finish",
        anchor_index,
        anchor_date = %window.anchor.date,
        feature_count = out.len()
    );

    Ok(out)
}

struct Window {
    anchor: Bar,
    closes: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    volumes: Vec<f64>,
}

impl Window {
    fn new(before: &[Bar], anchor: Bar) -> Self {
        Self {
            anchor,
            closes: before.iter().map(|b| b.close).collect(),
            highs: before.iter().map(|b| b.high).collect(),
            lows: before.iter().map(|b| b.low).collect(),
            volumes: before.iter().map(|b| b.volume).collect(),
        }
    }

    fn len(&self) -> usize {
        self.closes.len()
    }

    fn price(&self) -> f64 {
        self.anchor.close
    }
}

fn ratio_or_one(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        1.0
    }
}

fn volume_features(w: &Window, out: &mut FeatureVector) {
    let avg10 = indicators::sma_last(&w.volumes, 10);
    let avg20 = indicators::sma_last(&w.volumes, 20);

    if let Some(avg10) = avg10 {
        out.insert(FeatureName::AnchorVolumeRatio, ratio_or_one(w.anchor.volume, avg10));
        out.insert(FeatureName::AvgVolume10, avg10);
    }
    if let Some(avg20) = avg20 {
        out.insert(FeatureName::AvgVolume20, avg20);
    }
    if let Some(avg40) = indicators::sma_last(&w.volumes, 40) {
        out.insert(FeatureName::AvgVolume40, avg40);
    }
    if let (Some(avg10), Some(avg20)) = (avg10, avg20) {
        out.insert(FeatureName::VolumeContraction, ratio_or_one(avg10, avg20));
    }

    // Largest volume bar of the last 40 periods, or of the whole window when shorter.
    let span = w.len().min(40);
    let offset = w.len() - span;
    let mut max_idx = offset;
    for idx in offset..w.len() {
        if w.volumes[idx] > w.volumes[max_idx] {
            max_idx = idx;
        }
    }
    let max_volume = w.volumes[max_idx];
    let max_volume_low = w.lows[max_idx];
    out.insert(FeatureName::MaxVolume40, max_volume);
    out.insert(FeatureName::MaxVolumeBarLow, max_volume_low);

    let below = max_volume_low > 0.0 && w.price() < max_volume_low;
    out.flag(FeatureName::BelowMaxVolumeLow, below);
    let drop_pct = if below {
        (max_volume_low - w.price()) / max_volume_low * 100.0
    } else {
        0.0
    };
    out.insert(FeatureName::DropBelowMaxVolumeLowPct, drop_pct);

    if max_volume > 0.0 {
        out.insert(FeatureName::AnchorVolumeToMax, w.anchor.volume / max_volume);
    }
}

fn price_features(w: &Window, out: &mut FeatureVector) {
    let price = w.price();
    out.insert(FeatureName::AnchorPrice, price);

    if let (Some(highs), Some(lows)) = (tail(&w.highs, 20), tail(&w.lows, 20)) {
        let high20 = indicators::max(highs).unwrap_or(price);
        let low20 = indicators::min(lows).unwrap_or(price);
        out.insert(FeatureName::High20, high20);
        out.insert(FeatureName::Low20, low20);
        if high20 > low20 {
            out.insert(
                FeatureName::RelativePricePosition,
                (price - low20) / (high20 - low20) * 100.0,
            );
            out.insert(FeatureName::DrawdownFromHigh20, (high20 - price) / high20 * 100.0);
        } else {
            out.insert(FeatureName::RelativePricePosition, 50.0);
            out.insert(FeatureName::DrawdownFromHigh20, 0.0);
        }
        if low20 > 0.0 {
            out.insert(FeatureName::PriceRange20Pct, (high20 - low20) / low20 * 100.0);
        }
    }

    if let (Some(highs), Some(lows)) = (tail(&w.highs, 40), tail(&w.lows, 40)) {
        if let (Some(high40), Some(low40)) = (indicators::max(highs), indicators::min(lows)) {
            out.insert(FeatureName::High40, high40);
            out.insert(FeatureName::Low40, low40);
        }
    }
}

fn moving_average_features(w: &Window, out: &mut FeatureVector) {
    let price = w.price();
    for (period, name) in [
        (5, FeatureName::PriceVsMa5),
        (10, FeatureName::PriceVsMa10),
        (20, FeatureName::PriceVsMa20),
        (40, FeatureName::PriceVsMa40),
    ] {
        if let Some(ma) = indicators::sma_last(&w.closes, period) {
            if ma > 0.0 {
                out.insert(name, (price - ma) / ma * 100.0);
            }
        }
    }

    let n = w.len();
    if n >= 20 {
        let recent = indicators::sma_last(&w.closes, 5);
        let earlier = indicators::mean(&w.closes[n - 20..n - 15]);
        if let (Some(recent), Some(earlier)) = (recent, earlier) {
            if earlier > 0.0 {
                out.insert(FeatureName::Ma20Slope, (recent - earlier) / earlier * 100.0);
            }
        }
    }

    let mas = (
        indicators::sma_last(&w.closes, 5),
        indicators::sma_last(&w.closes, 10),
        indicators::sma_last(&w.closes, 20),
    );
    if let (Some(ma5), Some(ma10), Some(ma20)) = mas {
        let avg = (ma5 + ma10 + ma20) / 3.0;
        if avg > 0.0 {
            let dispersion =
                ((ma5 - avg).abs() + (ma10 - avg).abs() + (ma20 - avg).abs()) / avg * 100.0;
            out.insert(FeatureName::MaConvergence, dispersion);
        }
        out.flag(FeatureName::MaBullishStack, ma5 > ma10 && ma10 > ma20);
    }

    // Direction flips of MA5 over the last 25 changes, anchor close included.
    let mut closes = w.closes.clone();
    closes.push(price);
    let ma5 = indicators::sma_series(&closes, 5);
    if ma5.len() >= 2 {
        let recent = &ma5[ma5.len().saturating_sub(26)..];
        let flips = indicators::direction_flips(recent).min(25);
        out.insert(FeatureName::MaSmoothness, (25 - flips) as f64);
    }
}

fn volume_price_features(w: &Window, out: &mut FeatureVector) {
    if let (Some(closes), Some(volumes)) = (tail(&w.closes, 20), tail(&w.volumes, 20)) {
        let mut price_changes = Vec::with_capacity(19);
        let mut volume_changes = Vec::with_capacity(19);
        for i in 1..closes.len() {
            if closes[i - 1] != 0.0 && volumes[i - 1] != 0.0 {
                price_changes.push(closes[i] / closes[i - 1] - 1.0);
                volume_changes.push(volumes[i] / volumes[i - 1] - 1.0);
            }
        }
        if price_changes.len() > 5 {
            if let Some(corr) = indicators::pearson(&price_changes, &volume_changes) {
                out.insert(FeatureName::PriceVolumeCorrelation20, corr);
            }
        }
    }

    if let (Some(prev_close), Some(prev_volume)) = (w.closes.last(), w.volumes.last()) {
        let price_up = w.price() > *prev_close;
        let volume_up = w.anchor.volume > *prev_volume;
        out.flag(FeatureName::AnchorPriceUp, price_up);
        out.flag(FeatureName::AnchorVolumeUp, volume_up);
        out.flag(FeatureName::AnchorPriceVolumeUp, price_up && volume_up);
    }
}

fn close_range_pct(closes: &[f64]) -> Option<f64> {
    let high = indicators::max(closes)?;
    let low = indicators::min(closes)?;
    if low > 0.0 {
        Some((high - low) / low * 100.0)
    } else {
        None
    }
}

fn volatility_features(w: &Window, out: &mut FeatureVector) {
    for (period, range_name, std_name) in [
        (10, FeatureName::Volatility10, FeatureName::ReturnStd10),
        (20, FeatureName::Volatility20, FeatureName::ReturnStd20),
    ] {
        if let Some(range) = tail(&w.closes, period).and_then(close_range_pct) {
            out.insert(range_name, range);
        }
        if let Some(closes) = tail(&w.closes, period + 1) {
            let returns = indicators::pct_change(closes);
            if let Some(std) = indicators::population_std(&returns) {
                out.insert(std_name, std * 100.0);
            }
        }
    }
}

fn oscillator_features(w: &Window, out: &mut FeatureVector) {
    if let Some(macd) = indicators::macd(&w.closes) {
        out.insert(FeatureName::MacdDif, macd.dif);
        out.insert(FeatureName::MacdDea, macd.dea);
        out.insert(FeatureName::MacdHistogram, macd.histogram);
        out.flag(FeatureName::MacdGoldenCross, macd.golden_cross());
        out.flag(FeatureName::MacdAboveZero, macd.dif > 0.0);
    }

    if let Some(rsi) = indicators::rsi(&w.closes, 14) {
        out.insert(FeatureName::Rsi, rsi);
        out.flag(FeatureName::RsiOversold, rsi < 30.0);
        out.flag(FeatureName::RsiStrongZone, rsi > 50.0 && rsi < 70.0);
    }

    if let Some(kdj) = indicators::kdj(&w.highs, &w.lows, &w.closes, 9) {
        out.insert(FeatureName::KdjK, kdj.k);
        out.insert(FeatureName::KdjD, kdj.d);
        out.insert(FeatureName::KdjJ, kdj.j);
        out.flag(FeatureName::KdjOversold, kdj.k < 20.0 && kdj.d < 20.0);
    }

    let obv = indicators::obv_series(&w.closes, &w.volumes);
    if let Some(recent) = tail(&obv, 10) {
        let first = recent[0];
        let last = recent[recent.len() - 1];
        out.insert(FeatureName::ObvTrend, (last - first) / (first.abs() + 1.0) * 100.0);
    }
    if let Some(recent) = tail(&obv, 20) {
        if let Some(high) = indicators::max(recent) {
            out.flag(FeatureName::ObvNearHigh, recent[recent.len() - 1] >= high * 0.95);
        }
    }
}

fn bollinger_features(w: &Window, out: &mut FeatureVector) {
    let n = w.len();
    let Some(bands) = indicators::bollinger_at(&w.closes, n, 20, 2.0) else {
        return;
    };
    let Some(width) = bands.width_pct() else {
        return;
    };
    out.insert(FeatureName::BollingerWidth, width);
    out.insert(
        FeatureName::BollingerPosition,
        (w.price() - bands.lower) / (bands.upper - bands.lower + 0.01) * 100.0,
    );

    let earlier = n
        .checked_sub(9)
        .and_then(|end| indicators::bollinger_at(&w.closes, end, 20, 2.0))
        .and_then(|b| b.width_pct());
    if let Some(earlier_width) = earlier {
        out.flag(FeatureName::BollingerSqueeze, width < earlier_width * 0.8);
    }
}

fn chip_features(w: &Window, out: &mut FeatureVector) {
    let price = w.price();

    if let (Some(closes), Some(volumes)) = (tail(&w.closes, 20), tail(&w.volumes, 20)) {
        let total: f64 = volumes.iter().sum();
        if total > 0.0 {
            let weighted = closes.iter().zip(volumes).map(|(c, v)| c * v).sum::<f64>() / total;
            if weighted > 0.0 {
                out.insert(FeatureName::CostDeviation, (price - weighted) / weighted * 100.0);
                let variance = closes
                    .iter()
                    .zip(volumes)
                    .map(|(c, v)| (c - weighted) * (c - weighted) * v)
                    .sum::<f64>()
                    / total;
                out.insert(FeatureName::ChipConcentration, variance.sqrt() / weighted * 100.0);
            }
        }
    }

    // Cost-basis proxies over the full lookback: each bar's volume is assumed
    // to have changed hands at its close.
    let total: f64 = w.volumes.iter().sum();
    if total > 0.0 {
        let in_profit: f64 = w
            .closes
            .iter()
            .zip(&w.volumes)
            .filter(|(close, _)| **close <= price)
            .map(|(_, volume)| volume)
            .sum();
        out.insert(FeatureName::ProfitChipRatio, in_profit / total * 100.0);
    }
    let p5 = indicators::weighted_percentile(&w.closes, &w.volumes, 0.05);
    let p95 = indicators::weighted_percentile(&w.closes, &w.volumes, 0.95);
    if let (Some(p5), Some(p95)) = (p5, p95) {
        if p95 + p5 > 0.0 {
            out.insert(FeatureName::CostConcentration90, (p95 - p5) / (p95 + p5) * 100.0);
        }
    }
}

fn structure_features(w: &Window, cfg: &ExtractionConfig, out: &mut FeatureVector) {
    let price = w.price();

    if let Some(high20) = tail(&w.highs, 20).and_then(indicators::max) {
        out.flag(FeatureName::BreakoutHigh20, price > high20);
        out.flag(FeatureName::NearHigh20, price > high20 * 0.95);
    }
    if let Some(high40) = tail(&w.highs, 40).and_then(indicators::max) {
        out.flag(FeatureName::BreakoutHigh40, price > high40);
    }

    if let (Some(highs), Some(lows)) = (tail(&w.highs, 20), tail(&w.lows, 20)) {
        let quiet = highs
            .iter()
            .zip(lows)
            .filter(|(high, low)| {
                **low > 0.0 && (**high - **low) / **low * 100.0 < cfg.consolidation_range_pct
            })
            .count();
        out.insert(FeatureName::ConsolidationPeriods, quiet as f64);
    }

    // Bar-over-bar gain within `limit_up_window` bars; a weekly proxy when fed weekly bars.
    let span = (cfg.limit_up_window + 1).min(w.len());
    let recent = &w.closes[w.len() - span..];
    let threshold = cfg.limit_up_pct - 0.5;
    let hit = indicators::pct_change(recent)
        .iter()
        .any(|change| change * 100.0 >= threshold);
    out.flag(FeatureName::RecentLimitUp, hit);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

pub fn feature_schema() -> FeatureSchema {
    let names: Vec<String> = FeatureName::ALL
        .iter()
        .map(|name| name.as_str().to_string())
        .collect();
    let fingerprint = schema_fingerprint(FEATURE_SCHEMA_VERSION, &names);

    info!(
        component = "features",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        feature_count = names.len(),
        fingerprint = %fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        names,
    }
}

pub fn assert_schema_compatible(
    actual_version: u32,
    actual_fingerprint: &str,
    expected: &FeatureSchema,
) -> Result<(), SchemaError> {
    if actual_version != expected.version {
        return Err(SchemaError::VersionMismatch {
            expected: expected.version,
            actual: actual_version,
        });
    }
    if actual_fingerprint != expected.fingerprint {
        return Err(SchemaError::FingerprintMismatch {
            expected: expected.fingerprint.clone(),
            actual: actual_fingerprint.to_string(),
        });
    }
    Ok(())
}

fn schema_fingerprint(version: u32, names: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("features:");
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn catalog_keys_are_unique_and_parse_back() {
        let mut seen = HashSet::new();
        for name in FeatureName::ALL {
            assert!(seen.insert(name.as_str()), "duplicate key {}", name.as_str());
            assert_eq!(FeatureName::parse(name.as_str()), Some(*name));
        }
        assert_eq!(FeatureName::parse("not_a_feature"), None);
    }

    #[test]
    fn vector_drops_non_finite_values() {
        let mut vector = FeatureVector::new();
        vector.insert(FeatureName::Rsi, f64::NAN);
        vector.insert(FeatureName::KdjK, f64::INFINITY);
        vector.insert(FeatureName::KdjD, 12.5);
        assert_eq!(vector.len(), 1);
        assert_eq!(vector.get(FeatureName::KdjD), Some(12.5));
    }

    #[test]
    fn schema_fingerprint_tracks_version() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert_ne!(schema_fingerprint(1, &names), schema_fingerprint(2, &names));
        assert_eq!(schema_fingerprint(1, &names), schema_fingerprint(1, &names));
    }
}
