//! OHLCV series, the local CSV cache provider and board rules.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];
const CSV_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub code: String,
    pub period: Period,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("price series not available for {code} ({period})")]
    NotAvailable { code: String, period: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("bar record has {found} columns, expected at least {expected}")]
    InvalidRecordColumns { found: usize, expected: usize },
    #[error("failed to parse field {field} value '{value}'")]
    ParseField { field: &'static str, value: String },
    #[error("bars for {code} are not strictly ascending at {date}")]
    Unordered { code: String, date: NaiveDate },
}

impl PriceSeries {
    pub fn new(
        code: impl Into<String>,
        period: Period,
        bars: Vec<Bar>,
    ) -> Result<Self, SeriesError> {
        let code = code.into();
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SeriesError::Unordered {
                    code,
                    date: pair[1].date,
                });
            }
        }
        Ok(Self { code, period, bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Drops every bar dated after `end_date`.
    pub fn truncate_to(&mut self, end_date: NaiveDate) {
        let keep = self.bars.partition_point(|bar| bar.date <= end_date);
        self.bars.truncate(keep);
    }

    /// Index of the last bar dated on or before `date`.
    pub fn index_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.bars.partition_point(|bar| bar.date <= date).checked_sub(1)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }
}

/// Source of OHLCV history. Implementations must treat "not available" and
/// "too few bars" the same way from the caller's point of view.
pub trait PriceSeriesProvider: Send + Sync {
    fn get_price_series(
        &self,
        code: &str,
        period: Period,
        end_date: Option<NaiveDate>,
    ) -> Result<PriceSeries, SeriesError>;
}

/// Reads `<root>/<period>/<code>.csv` files with a
/// `date,open,high,low,close,volume` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvDirectoryProvider {
    root: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, code: &str, period: Period) -> PathBuf {
        self.root.join(period.as_str()).join(format!("{code}.csv"))
    }

    /// Codes with a cached file for either period, sorted and deduplicated.
    pub fn list_codes(&self) -> Result<Vec<String>, SeriesError> {
        let mut codes = Vec::new();
        for period in [Period::Weekly, Period::Daily] {
            let dir = self.root.join(period.as_str());
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                let is_csv = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false);
                if !is_csv {
                    continue;
                }
                if let Some(stem) = path.file_stem() {
                    codes.push(stem.to_string_lossy().to_string());
                }
            }
        }
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    fn read_file(&self, code: &str, period: Period) -> Result<Option<PriceSeries>, SeriesError> {
        let path = self.path_for(code, period);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let bars = parse_bars_csv(&bytes)?;
        debug!(
            component = "series",
            event = "series.csv.read",
            code,
            period = period.as_str(),
            path = %path.display(),
            bars = bars.len()
        );
        PriceSeries::new(code, period, bars).map(Some)
    }
}

impl PriceSeriesProvider for CsvDirectoryProvider {
    fn get_price_series(
        &self,
        code: &str,
        period: Period,
        end_date: Option<NaiveDate>,
    ) -> Result<PriceSeries, SeriesError> {
        let mut series = match (self.read_file(code, period)?, period) {
            (Some(series), _) => series,
            (None, Period::Weekly) => {
                let daily = self
                    .read_file(code, Period::Daily)?
                    .ok_or(SeriesError::NotAvailable {
                        code: code.to_string(),
                        period: period.as_str(),
                    })?;
                info!(
                    component = "series",
                    event = "series.weekly.aggregated",
                    code,
                    daily_bars = daily.len()
                );
                aggregate_weekly(&daily)?
            }
            (None, Period::Daily) => {
                return Err(SeriesError::NotAvailable {
                    code: code.to_string(),
                    period: period.as_str(),
                })
            }
        };

        if let Some(end_date) = end_date {
            series.truncate_to(end_date);
        }
        if series.is_empty() {
            return Err(SeriesError::NotAvailable {
                code: code.to_string(),
                period: period.as_str(),
            });
        }
        Ok(series)
    }
}

/// Rolls daily bars up into ISO weeks. Each weekly bar is dated on the last
/// trading day of its week.
pub fn aggregate_weekly(daily: &PriceSeries) -> Result<PriceSeries, SeriesError> {
    let mut weeks: Vec<Bar> = Vec::new();
    let mut current_week = None;

    for bar in &daily.bars {
        let week = bar.date.iso_week();
        let key = (week.year(), week.week());
        match weeks.last_mut() {
            Some(last) if current_week == Some(key) => {
                last.date = bar.date;
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
                last.close = bar.close;
                last.volume += bar.volume;
            }
            _ => {
                weeks.push(*bar);
                current_week = Some(key);
            }
        }
    }

    PriceSeries::new(daily.code.clone(), Period::Weekly, weeks)
}

pub fn parse_bars_csv(bytes: &[u8]) -> Result<Vec<Bar>, SeriesError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(Cursor::new(bytes));

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        bars.push(parse_bar_record(&record)?);
    }
    bars.sort_by_key(|bar| bar.date);
    bars.dedup_by_key(|bar| bar.date);
    Ok(bars)
}

fn parse_bar_record(record: &StringRecord) -> Result<Bar, SeriesError> {
    if record.len() < CSV_COLUMNS {
        return Err(SeriesError::InvalidRecordColumns {
            found: record.len(),
            expected: CSV_COLUMNS,
        });
    }

    Ok(Bar {
        date: parse_date(record, 0)?,
        open: parse_f64(record, 1, "open")?,
        high: parse_f64(record, 2, "high")?,
        low: parse_f64(record, 3, "low")?,
        close: parse_f64(record, 4, "close")?,
        volume: parse_f64(record, 5, "volume")?,
    })
}

fn parse_date(record: &StringRecord, idx: usize) -> Result<NaiveDate, SeriesError> {
    let raw = record.get(idx).unwrap_or_default();
    // Cached exports sometimes carry a time component.
    let day = raw.split([' ', 'T']).next().unwrap_or_default();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
        .ok_or_else(|| SeriesError::ParseField {
            field: "date",
            value: raw.to_string(),
        })
}

fn parse_f64(record: &StringRecord, idx: usize, field: &'static str) -> Result<f64, SeriesError> {
    let raw = record.get(idx).unwrap_or_default();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SeriesError::ParseField {
            field,
            value: raw.to_string(),
        }),
    }
}

/// A-share listing board, which fixes the daily price limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    Main,
    ChiNext,
    Star,
    Beijing,
}

impl Board {
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        if code.starts_with("300") || code.starts_with("301") {
            Self::ChiNext
        } else if code.starts_with("688") {
            Self::Star
        } else if code.starts_with("92") || code.starts_with('8') || code.starts_with('4') {
            Self::Beijing
        } else {
            Self::Main
        }
    }

    pub fn limit_up_pct(self) -> f64 {
        match self {
            Self::Main => 10.0,
            Self::ChiNext | Self::Star => 20.0,
            Self::Beijing => 30.0,
        }
    }
}
