use bullmatch::{extract_features, Bar, EngineError, ExtractionConfig, FeatureName};
use chrono::{Duration, NaiveDate};

fn week(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 6).expect("valid start date") + Duration::weeks(i as i64)
}

fn flat_series(len: usize) -> Vec<Bar> {
    (0..len)
        .map(|i| Bar {
            date: week(i),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.0,
            volume: 1_000.0,
        })
        .collect()
}

fn wavy_series(len: usize) -> Vec<Bar> {
    (0..len)
        .map(|i| {
            let x = i as f64;
            let close = 20.0 + 3.0 * (x * 0.3).sin() + 0.05 * x;
            Bar {
                date: week(i),
                open: close * 0.99,
                high: close * 1.02,
                low: close * 0.98,
                close,
                volume: 1_000.0 + 300.0 * ((i * 7) % 5) as f64,
            }
        })
        .collect()
}

fn value(vector: &bullmatch::FeatureVector, name: FeatureName) -> f64 {
    vector
        .get(name)
        .unwrap_or_else(|| panic!("feature {name} should be present"))
}

#[test]
fn flat_window_produces_expected_values() {
    let bars = flat_series(41);
    let features =
        extract_features(&bars, 40, &ExtractionConfig::default()).expect("history is sufficient");

    assert_eq!(features.meta.anchor_index, Some(40));
    assert_eq!(features.meta.anchor_date, Some(week(40)));

    assert_eq!(value(&features, FeatureName::AnchorVolumeRatio), 1.0);
    assert_eq!(value(&features, FeatureName::VolumeContraction), 1.0);
    assert_eq!(value(&features, FeatureName::MaxVolume40), 1_000.0);
    assert_eq!(value(&features, FeatureName::MaxVolumeBarLow), 9.0);
    assert_eq!(value(&features, FeatureName::BelowMaxVolumeLow), 0.0);
    assert_eq!(value(&features, FeatureName::RelativePricePosition), 50.0);
    assert!((value(&features, FeatureName::DrawdownFromHigh20) - 100.0 / 11.0).abs() < 1e-9);
    assert_eq!(value(&features, FeatureName::PriceVsMa20), 0.0);
    assert_eq!(value(&features, FeatureName::ProfitChipRatio), 100.0);
    assert_eq!(value(&features, FeatureName::CostConcentration90), 0.0);
    assert_eq!(value(&features, FeatureName::Volatility20), 0.0);
    assert_eq!(value(&features, FeatureName::ReturnStd20), 0.0);
    assert_eq!(value(&features, FeatureName::MaSmoothness), 25.0);
    assert_eq!(value(&features, FeatureName::MaBullishStack), 0.0);
    assert_eq!(value(&features, FeatureName::BreakoutHigh20), 0.0);
    assert_eq!(value(&features, FeatureName::ConsolidationPeriods), 0.0);
    assert_eq!(value(&features, FeatureName::RecentLimitUp), 0.0);
    assert_eq!(value(&features, FeatureName::AnchorPriceUp), 0.0);
    assert_eq!(value(&features, FeatureName::BollingerWidth), 0.0);

    // No variance on either side, so no correlation is defined.
    assert!(!features.contains(FeatureName::PriceVolumeCorrelation20));
}

#[test]
fn insufficient_history_is_a_hard_stop() {
    let bars = flat_series(30);
    let err = extract_features(&bars, 29, &ExtractionConfig::default())
        .expect_err("30 bars cannot satisfy a 40-bar lookback");
    assert_eq!(
        err,
        EngineError::InsufficientHistory {
            required: 41,
            available: 30
        }
    );

    let err = extract_features(&bars, 30, &ExtractionConfig::default())
        .expect_err("anchor past the end");
    assert_eq!(err, EngineError::AnchorOutOfRange { anchor_index: 30, len: 30 });
}

#[test]
fn lookback_below_minimum_is_rejected() {
    let bars = flat_series(41);
    let cfg = ExtractionConfig {
        lookback_periods: 10,
        ..ExtractionConfig::default()
    };
    let err = extract_features(&bars, 40, &cfg).expect_err("lookback of 10 is too short");
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[test]
fn extraction_is_deterministic_and_complete() {
    let bars = wavy_series(80);
    let cfg = ExtractionConfig::default();

    let a = extract_features(&bars, 60, &cfg).expect("first extraction");
    let b = extract_features(&bars, 60, &cfg).expect("second extraction");

    assert_eq!(a, b);
    for ((name_a, value_a), (name_b, value_b)) in a.iter().zip(b.iter()) {
        assert_eq!(name_a, name_b);
        assert_eq!(value_a.to_bits(), value_b.to_bits());
    }
    assert_eq!(a.len(), FeatureName::ALL.len());
    assert!(a.iter().all(|(_, v)| v.is_finite()));
}

#[test]
fn bars_after_the_anchor_are_never_read() {
    let bars = wavy_series(80);
    let cfg = ExtractionConfig::default();
    let full = extract_features(&bars, 50, &cfg).expect("full series");

    let truncated = extract_features(&bars[..51], 50, &cfg).expect("truncated series");
    assert_eq!(full, truncated);

    let mut altered = bars.clone();
    for bar in altered.iter_mut().skip(51) {
        bar.close *= 3.0;
        bar.high *= 3.0;
        bar.volume *= 10.0;
    }
    let altered = extract_features(&altered, 50, &cfg).expect("altered future");
    assert_eq!(full, altered);
}

#[test]
fn short_lookback_omits_longer_sub_windows() {
    let bars = wavy_series(60);
    let cfg = ExtractionConfig {
        lookback_periods: 20,
        ..ExtractionConfig::default()
    };
    let features = extract_features(&bars, 30, &cfg).expect("history is sufficient");

    for absent in [
        FeatureName::AvgVolume40,
        FeatureName::High40,
        FeatureName::Low40,
        FeatureName::PriceVsMa40,
        FeatureName::BreakoutHigh40,
        FeatureName::ReturnStd20,
        FeatureName::MacdDif,
        FeatureName::BollingerSqueeze,
    ] {
        assert!(!features.contains(absent), "{absent} should be omitted");
    }
    for present in [
        FeatureName::AvgVolume20,
        FeatureName::PriceVsMa20,
        FeatureName::ReturnStd10,
        FeatureName::Rsi,
        FeatureName::KdjK,
        FeatureName::BollingerWidth,
        FeatureName::ProfitChipRatio,
    ] {
        assert!(features.contains(present), "{present} should be present");
    }
}

#[test]
fn limit_up_flag_follows_the_board_limit() {
    let mut bars = flat_series(41);
    for bar in bars.iter_mut().skip(37) {
        bar.close = 11.0;
        bar.high = 11.5;
    }

    let main_board = ExtractionConfig::default().for_code("600519");
    let features = extract_features(&bars, 40, &main_board).expect("history is sufficient");
    assert_eq!(value(&features, FeatureName::RecentLimitUp), 1.0);

    let chinext = ExtractionConfig::default().for_code("300750");
    assert_eq!(chinext.limit_up_pct, 20.0);
    let features = extract_features(&bars, 40, &chinext).expect("history is sufficient");
    assert_eq!(value(&features, FeatureName::RecentLimitUp), 0.0);
}

#[test]
fn profit_chip_ratio_counts_volume_at_or_below_anchor_close() {
    let mut bars = flat_series(41);
    // Half the window's volume traded above the anchor close.
    for bar in bars.iter_mut().take(40).skip(20) {
        bar.close = 12.0;
        bar.high = 12.5;
        bar.low = 11.5;
    }
    let features =
        extract_features(&bars, 40, &ExtractionConfig::default()).expect("history is sufficient");
    assert_eq!(value(&features, FeatureName::ProfitChipRatio), 50.0);
    assert_eq!(value(&features, FeatureName::AnchorPriceUp), 0.0);
}

#[test]
fn limit_up_proxy_counts_bars_before_the_anchor() {
    let cfg = ExtractionConfig::default().for_code("600519");
    let step_at = |start: usize, close: f64| {
        let mut bars = flat_series(41);
        for bar in bars.iter_mut().skip(start) {
            bar.close = close;
            bar.high = close + 0.5;
        }
        bars
    };

    // A 10% week 8 bars before the anchor is inside the window.
    let features = extract_features(&step_at(32, 11.0), 40, &cfg).expect("history is sufficient");
    assert_eq!(value(&features, FeatureName::RecentLimitUp), 1.0);

    // One bar earlier falls outside it.
    let features = extract_features(&step_at(31, 11.0), 40, &cfg).expect("history is sufficient");
    assert_eq!(value(&features, FeatureName::RecentLimitUp), 0.0);

    // A 9% week is below the 9.5% proxy threshold.
    let features = extract_features(&step_at(35, 10.9), 40, &cfg).expect("history is sufficient");
    assert_eq!(value(&features, FeatureName::RecentLimitUp), 0.0);
}
