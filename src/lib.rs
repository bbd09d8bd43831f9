//! Bull-stock pre-breakout pattern matching.
//!
//! Pipeline:
//! - locate the max-gain interval and its volume-surge anchor
//! - extract a named feature vector at the anchor
//! - train a calibrated statistical template from labeled anchors
//! - score new anchors against the template

mod config;
mod error;
mod features;
mod indicators;
mod interval;
mod observability;
mod pipeline;
mod scan;
mod scorer;
mod series;
mod surge;
mod template;
mod trainer;

pub use config::{ConfigError, EngineConfig, CONFIG_PATH_ENV};
pub use error::EngineError;
pub use features::{
    assert_schema_compatible, extract_features, feature_schema, ExtractionConfig, FeatureMeta,
    FeatureName, FeatureSchema, FeatureVector, SchemaError, FEATURE_SCHEMA_VERSION,
    MIN_LOOKBACK_PERIODS,
};
pub use interval::{find_max_gain_interval, GainInterval, IntervalConfig, NoQualifyingInterval};
pub use observability::{
    init_logging, log_app_start, log_data_source, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError, LOG_FORMAT_ENV, LOG_LEVEL_ENV, LOG_TARGET_ENV,
};
pub use pipeline::{
    build_training_sample, collect_training_samples, find_buy_points, locate_training_anchor,
    resolve_anchor, AnchorSource, BuyPoint, PipelineError, SkippedCode, TrainingAnchor,
};
pub use scan::{scan_code, scan_codes, ScanEntry, ScanError, ScanOptions, ScanOutcome, ScanReport};
pub use scorer::{
    feature_score, score, tier_of, FeatureScore, MatchResult, ScoringConfig, Tier, TierAggregate,
};
pub use series::{
    aggregate_weekly, parse_bars_csv, Bar, Board, CsvDirectoryProvider, Period, PriceSeries,
    PriceSeriesProvider, SeriesError,
};
pub use surge::{find_volume_surge_point, SurgeConfig, VolumeBaseline};
pub use template::{
    CalibrationStatus, CalibrationSummary, FeatureStats, FeatureTemplate, SkippedFeature,
    TemplateError,
};
pub use trainer::{aggregate, train, SampleScore, TrainingConfig, TrainingReport};
