//! Tracing setup for the binaries, driven by `BULLMATCH_LOG_*` variables.

use std::env;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "BULLMATCH_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "BULLMATCH_LOG_FORMAT";
pub const LOG_TARGET_ENV: &str = "BULLMATCH_LOG_TARGET";

const FALLBACK_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event; what the smoke tests and log shippers read.
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `bullmatch::trainer=debug`.
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: FALLBACK_FILTER.to_string(),
            format: LogFormat::Pretty,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    /// Builds a config from a variable lookup. Blank or unparseable values
    /// keep the default for that field.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let level = lookup(LOG_LEVEL_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or(defaults.level);
        let format = lookup(LOG_FORMAT_ENV)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.format);
        let include_target = lookup(LOG_TARGET_ENV)
            .and_then(|raw| parse_switch(&raw))
            .unwrap_or(defaults.include_target);

        Self {
            level,
            format,
            include_target,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    LoggingConfig::from_lookup(|key| env::var(key).ok())
}

/// Installs the global subscriber. An invalid filter directive falls back to
/// `info` and is reported once the subscriber is live.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let (filter, rejected) = match EnvFilter::try_new(&config.level) {
        Ok(filter) => (filter, None),
        Err(err) => (EnvFilter::new(FALLBACK_FILTER), Some(err.to_string())),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_target);

    match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.json().with_ansi(false).finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
    }

    if let Some(error) = rejected {
        warn!(
            component = "observability",
            event = "logging.filter.rejected",
            filter = %config.level,
            error = %error
        );
    }
    Ok(())
}

pub fn log_app_start(app: &'static str, config: &LoggingConfig) {
    info!(
        component = app,
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format
    );
}

pub fn log_data_source(app: &'static str, root: &Path, code_count: usize) {
    info!(
        component = app,
        event = "app.data_source",
        data_root = %root.display(),
        code_count
    );
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
