use bullmatch::{
    find_max_gain_interval, find_volume_surge_point, Bar, EngineError, VolumeBaseline,
};
use chrono::{Duration, NaiveDate};

fn week(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 4).expect("valid start date") + Duration::weeks(i as i64)
}

fn bar(i: usize, close: f64, high: f64, volume: f64) -> Bar {
    Bar {
        date: week(i),
        open: close,
        high,
        low: close.min(high) * 0.98,
        close,
        volume,
    }
}

/// Flat at 14, a dip to 10 at index 10, then a run to a high of 41 at index 14.
fn planted_series() -> Vec<Bar> {
    let mut bars = Vec::new();
    for i in 0..10 {
        bars.push(bar(i, 14.0, 14.0, 1_000.0));
    }
    bars.push(bar(10, 10.0, 10.0, 1_000.0));
    bars.push(bar(11, 15.0, 15.0, 1_000.0));
    bars.push(bar(12, 22.0, 22.0, 1_000.0));
    bars.push(bar(13, 30.0, 30.0, 1_000.0));
    bars.push(bar(14, 40.0, 41.0, 1_000.0));
    for i in 15..30 {
        bars.push(bar(i, 20.0, 20.0, 1_000.0));
    }
    bars
}

#[test]
fn finds_the_planted_maximal_window() {
    let bars = planted_series();
    let interval = find_max_gain_interval(&bars, 8, 300.0).expect("planted window qualifies");

    assert_eq!(interval.start_index, 10);
    assert_eq!(interval.end_index, 14);
    assert_eq!(interval.period_count, 5);
    assert_eq!(interval.start_price, 10.0);
    assert_eq!(interval.end_price, 40.0);
    assert_eq!(interval.max_price_in_window, 41.0);
    assert!((interval.gain_percent - 310.0).abs() < 1e-9);
}

#[test]
fn reports_best_window_when_threshold_is_missed() {
    let bars = planted_series();
    let err = find_max_gain_interval(&bars, 8, 400.0).expect_err("310% is below 400%");

    let best = err.best.expect("best window is carried");
    assert_eq!(best.start_index, 10);
    assert!((err.best_gain_percent.expect("gain") - 310.0).abs() < 1e-9);
}

#[test]
fn short_series_has_no_interval() {
    let bars = vec![bar(0, 10.0, 50.0, 1.0)];
    let err = find_max_gain_interval(&bars, 8, 0.0).expect_err("one bar cannot form a window");
    assert!(err.best.is_none());

    let err = find_max_gain_interval(&[], 8, 0.0).expect_err("empty series");
    assert_eq!(err.best_gain_percent, None);
}

#[test]
fn window_is_clipped_at_series_end() {
    let bars = vec![
        bar(0, 10.0, 10.0, 1.0),
        bar(1, 12.0, 12.0, 1.0),
        bar(2, 25.0, 25.0, 1.0),
    ];
    let interval = find_max_gain_interval(&bars, 8, 100.0).expect("150% qualifies");
    assert_eq!((interval.start_index, interval.end_index), (0, 2));
    assert!((interval.gain_percent - 150.0).abs() < 1e-9);
}

#[test]
fn window_length_is_bounded() {
    // The peak sits 4 bars after the low; a 3-bar limit cannot reach it.
    let bars = vec![
        bar(0, 10.0, 10.0, 1.0),
        bar(1, 11.0, 11.0, 1.0),
        bar(2, 11.0, 11.0, 1.0),
        bar(3, 11.0, 11.0, 1.0),
        bar(4, 30.0, 30.0, 1.0),
    ];
    let interval = find_max_gain_interval(&bars, 3, 0.0).expect("some window qualifies");
    assert_eq!(interval.start_index, 1);
    assert_eq!(interval.end_index, 4);
}

#[test]
fn equal_gains_prefer_earliest_start_then_shortest_window() {
    let bars = vec![
        bar(0, 10.0, 10.0, 1.0),
        bar(1, 20.0, 20.0, 1.0),
        bar(2, 20.0, 20.0, 1.0),
        bar(3, 10.0, 10.0, 1.0),
        bar(4, 20.0, 20.0, 1.0),
    ];
    let interval = find_max_gain_interval(&bars, 8, 100.0).expect("100% qualifies");
    assert_eq!((interval.start_index, interval.end_index), (0, 1));
}

fn volume_series(volumes: &[f64]) -> Vec<Bar> {
    volumes
        .iter()
        .enumerate()
        .map(|(i, v)| bar(i, 10.0, 10.5, *v))
        .collect()
}

#[test]
fn surge_picks_largest_ratio_in_lookback() {
    let mut volumes = vec![1_000.0; 40];
    volumes[20] = 4_000.0;
    volumes[30] = 6_000.0;
    let bars = volume_series(&volumes);

    let surge = find_volume_surge_point(&bars, 35, 20, 3.0, VolumeBaseline::TrailingMedian { periods: 10 })
        .expect("history is sufficient");
    assert_eq!(surge, Some(30));

    // Index 30 is outside a 4-bar lookback from 35.
    let surge = find_volume_surge_point(&bars, 35, 4, 3.0, VolumeBaseline::TrailingMedian { periods: 10 })
        .expect("history is sufficient");
    assert_eq!(surge, None);
}

#[test]
fn surge_requires_the_minimum_ratio() {
    let mut volumes = vec![1_000.0; 30];
    volumes[25] = 2_500.0;
    let bars = volume_series(&volumes);

    let surge = find_volume_surge_point(&bars, 29, 20, 3.0, VolumeBaseline::TrailingMedian { periods: 10 })
        .expect("history is sufficient");
    assert_eq!(surge, None);

    let surge = find_volume_surge_point(&bars, 29, 20, 2.5, VolumeBaseline::TrailingMedian { periods: 10 })
        .expect("history is sufficient");
    assert_eq!(surge, Some(25));
}

#[test]
fn surge_ties_resolve_to_the_earlier_bar() {
    let mut volumes = vec![1_000.0; 12];
    volumes[4] = 5_000.0;
    volumes[8] = 1_000.0;
    volumes[9] = 5_000.0;
    let bars = volume_series(&volumes);

    let surge = find_volume_surge_point(&bars, 11, 10, 3.0, VolumeBaseline::PreviousBar)
        .expect("history is sufficient");
    assert_eq!(surge, Some(4));
}

#[test]
fn surge_reports_insufficient_history_and_bad_reference() {
    let bars = volume_series(&[1_000.0; 5]);

    let err = find_volume_surge_point(&bars, 4, 52, 3.0, VolumeBaseline::TrailingMedian { periods: 10 })
        .expect_err("no bar has a full baseline");
    assert_eq!(
        err,
        EngineError::InsufficientHistory {
            required: 11,
            available: 5
        }
    );

    let err = find_volume_surge_point(&bars, 9, 52, 3.0, VolumeBaseline::PreviousBar)
        .expect_err("reference is past the end");
    assert_eq!(err, EngineError::AnchorOutOfRange { anchor_index: 9, len: 5 });
}

#[test]
fn surge_ignores_zero_volume_baselines() {
    let mut volumes = vec![0.0; 8];
    volumes[7] = 100.0;
    let bars = volume_series(&volumes);
    let surge = find_volume_surge_point(&bars, 7, 7, 3.0, VolumeBaseline::PreviousBar)
        .expect("history is sufficient");
    assert_eq!(surge, None);
}
