use std::fs;
use std::path::Path;

use bullmatch::{CsvDirectoryProvider, Period, PriceSeriesProvider, SeriesError};
use chrono::NaiveDate;
use tempfile::tempdir;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn write_csv(root: &Path, period: &str, code: &str, body: &str) {
    let dir = root.join(period);
    fs::create_dir_all(&dir).expect("create period dir");
    fs::write(dir.join(format!("{code}.csv")), body).expect("write csv");
}

const DAILY: &str = "date,open,high,low,close,volume
2024-01-02,10.0,10.5,9.8,10.2,1000
2024-01-03,10.2,10.9,10.1,10.8,1500
2024-01-05,10.8,11.2,10.6,11.0,1200
2024-01-08,11.0,11.4,10.9,11.3,900
2024-01-10,11.3,12.0,11.2,11.9,2100
";

#[test]
fn reads_daily_csv_and_truncates_to_end_date() {
    let dir = tempdir().expect("tempdir");
    write_csv(dir.path(), "daily", "000001", DAILY);
    let provider = CsvDirectoryProvider::new(dir.path());

    let series = provider
        .get_price_series("000001", Period::Daily, None)
        .expect("daily series loads");
    assert_eq!(series.code, "000001");
    assert_eq!(series.period, Period::Daily);
    assert_eq!(series.len(), 5);
    assert_eq!(series.bars[4].close, 11.9);

    let truncated = provider
        .get_price_series("000001", Period::Daily, Some(day(2024, 1, 6)))
        .expect("truncated series loads");
    assert_eq!(truncated.len(), 3);
    assert_eq!(truncated.bars[2].date, day(2024, 1, 5));
}

#[test]
fn weekly_requests_fall_back_to_aggregated_daily_bars() {
    let dir = tempdir().expect("tempdir");
    write_csv(dir.path(), "daily", "300750", DAILY);
    let provider = CsvDirectoryProvider::new(dir.path());

    let weekly = provider
        .get_price_series("300750", Period::Weekly, None)
        .expect("weekly series aggregates");
    assert_eq!(weekly.period, Period::Weekly);
    assert_eq!(weekly.len(), 2);

    let first = weekly.bars[0];
    assert_eq!(first.date, day(2024, 1, 5));
    assert_eq!(first.open, 10.0);
    assert_eq!(first.high, 11.2);
    assert_eq!(first.low, 9.8);
    assert_eq!(first.close, 11.0);
    assert_eq!(first.volume, 3700.0);
}

#[test]
fn cached_weekly_file_wins_over_aggregation() {
    let dir = tempdir().expect("tempdir");
    write_csv(dir.path(), "daily", "600519", DAILY);
    write_csv(
        dir.path(),
        "weekly",
        "600519",
        "date,open,high,low,close,volume\n2024-01-05,1,2,0.5,1.5,10\n",
    );
    let provider = CsvDirectoryProvider::new(dir.path());

    let weekly = provider
        .get_price_series("600519", Period::Weekly, None)
        .expect("weekly file loads");
    assert_eq!(weekly.len(), 1);
    assert_eq!(weekly.bars[0].close, 1.5);
}

#[test]
fn unsorted_rows_with_whitespace_are_normalized() {
    let dir = tempdir().expect("tempdir");
    write_csv(
        dir.path(),
        "daily",
        "000002",
        "date,open,high,low,close,volume
 2024-01-03 , 2, 3, 1, 2.5, 20
20240102,1,2,0.5,1.5,10
2024/01/03,9,9,9,9,9

",
    );
    let provider = CsvDirectoryProvider::new(dir.path());
    let series = provider
        .get_price_series("000002", Period::Daily, None)
        .expect("series loads");

    assert_eq!(series.len(), 2);
    assert_eq!(series.bars[0].date, day(2024, 1, 2));
    assert_eq!(series.bars[1].close, 2.5);
}

#[test]
fn missing_or_empty_series_is_not_available() {
    let dir = tempdir().expect("tempdir");
    write_csv(dir.path(), "daily", "000001", DAILY);
    let provider = CsvDirectoryProvider::new(dir.path());

    let err = provider
        .get_price_series("999999", Period::Weekly, None)
        .expect_err("no file for this code");
    assert!(matches!(err, SeriesError::NotAvailable { .. }));

    let err = provider
        .get_price_series("000001", Period::Daily, Some(day(2023, 12, 31)))
        .expect_err("nothing on or before end date");
    assert!(matches!(err, SeriesError::NotAvailable { .. }));
}

#[test]
fn malformed_rows_surface_parse_errors() {
    let dir = tempdir().expect("tempdir");
    write_csv(
        dir.path(),
        "daily",
        "000003",
        "date,open,high,low,close,volume\n2024-01-02,1,2,0.5,abc,10\n",
    );
    let provider = CsvDirectoryProvider::new(dir.path());
    let err = provider
        .get_price_series("000003", Period::Daily, None)
        .expect_err("close is not numeric");
    assert!(matches!(err, SeriesError::ParseField { field: "close", .. }));
}

#[test]
fn list_codes_merges_both_periods() {
    let dir = tempdir().expect("tempdir");
    write_csv(dir.path(), "daily", "000001", DAILY);
    write_csv(dir.path(), "daily", "300750", DAILY);
    write_csv(dir.path(), "weekly", "000001", DAILY);
    write_csv(dir.path(), "weekly", "688001", DAILY);
    fs::write(dir.path().join("weekly").join("notes.txt"), "ignored").expect("write note");

    let provider = CsvDirectoryProvider::new(dir.path());
    let codes = provider.list_codes().expect("list codes");
    assert_eq!(codes, vec!["000001", "300750", "688001"]);
}
