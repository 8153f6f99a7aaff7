use std::path::PathBuf;

use redacta_trainer::{DEFAULT_DATASET, DEFAULT_MODEL_DIR, TrainerConfig, run_training};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dataset = std::env::var("REDACTA_DATASET").unwrap_or_else(|_| DEFAULT_DATASET.to_string());
    let model_dir =
        std::env::var("REDACTA_MODEL_DIR").unwrap_or_else(|_| DEFAULT_MODEL_DIR.to_string());

    match run_training(
        &PathBuf::from(dataset),
        &PathBuf::from(model_dir),
        TrainerConfig::default(),
    ) {
        Ok(report) => {
            tracing::info!(losses = ?report.losses, "{}", report.message);
        }
        Err(e) => {
            eprintln!("Training failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
