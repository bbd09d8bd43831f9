use std::path::PathBuf;
use std::sync::Arc;

use bullmatch::{
    init_logging, log_app_start, log_data_source, logging_config_from_env, scan_codes,
    CsvDirectoryProvider, EngineConfig, FeatureTemplate, ScanOptions, ScanOutcome,
};

const APP: &str = "market_scan";
const TOP_N: usize = 50;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(APP, &logging_cfg);

    let cfg = EngineConfig::from_env()?;
    let data_root = std::env::var("BULLMATCH_DATA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    let template_path = std::env::var("BULLMATCH_TEMPLATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models/template.json"));

    let mut options = ScanOptions::default();
    if let Ok(raw) = std::env::var("BULLMATCH_SCAN_THRESHOLD") {
        options.threshold = raw.trim().parse()?;
    }
    if let Ok(raw) = std::env::var("BULLMATCH_SCAN_WORKERS") {
        options.max_workers = raw.trim().parse()?;
    }

    let template = FeatureTemplate::load_json(&template_path)?;
    if let Some(calibration) = &template.calibration {
        if !calibration.status.is_converged() {
            println!("warning: template was not fully calibrated");
        }
    }

    let provider = CsvDirectoryProvider::new(&data_root);
    let codes = provider.list_codes()?;
    log_data_source(APP, provider.root(), codes.len());

    let report = scan_codes(
        Arc::new(provider),
        codes,
        Arc::new(template),
        Arc::new(cfg),
        options,
    )
    .await?;

    println!(
        "scan finished | scanned={} matched={} skipped={} threshold={:.2}",
        report.entries.len(),
        report.matched().count(),
        report.skipped_count(),
        options.threshold
    );
    for entry in report.matched().take(TOP_N) {
        if let ScanOutcome::Matched {
            score,
            anchor_date,
            source,
        } = &entry.outcome
        {
            println!("  {:<10} {:.4} anchor={} via {:?}", entry.code, score, anchor_date, source);
        }
    }

    Ok(())
}
