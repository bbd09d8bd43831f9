use std::path::PathBuf;

use bullmatch::{
    collect_training_samples, init_logging, log_app_start, log_data_source,
    logging_config_from_env, train, CalibrationStatus, CsvDirectoryProvider, EngineConfig, Period,
};

const APP: &str = "train_template";

fn main() -> Result<(), Box<dyn std::error::Error>> {
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
    let codes = parse_codes(&std::env::var("BULLMATCH_TRAINING_CODES").unwrap_or_default());
    if codes.is_empty() {
        return Err("BULLMATCH_TRAINING_CODES must list at least one code".into());
    }

    let provider = CsvDirectoryProvider::new(&data_root);
    log_data_source(APP, provider.root(), codes.len());

    let (samples, skipped) = collect_training_samples(&provider, &codes, Period::Weekly, &cfg);
    for code in &skipped {
        println!("skipped {}: {}", code.code, code.reason);
    }
    if samples.is_empty() {
        return Err(format!("no training samples from {} codes", codes.len()).into());
    }

    let report = train(&samples, &cfg.training, &cfg.scoring)?;
    report.template.save_json(&template_path)?;

    println!(
        "template written | path={} samples={} features={} iterations={}",
        template_path.display(),
        report.template.sample_count,
        report.template.features.len(),
        report.iterations
    );
    for sample in &report.sample_scores {
        println!("  {:<24} {:.4}", sample.id, sample.score);
    }
    match &report.status {
        CalibrationStatus::Converged => println!(
            "calibration converged: every sample >= {:.2}",
            cfg.training.target_min_match
        ),
        CalibrationStatus::MaxIterationsExceeded { failing_samples } => println!(
            "calibration NOT converged after {} iterations; below target: {}",
            report.iterations,
            failing_samples.join(", ")
        ),
    }

    Ok(())
}

fn parse_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}
