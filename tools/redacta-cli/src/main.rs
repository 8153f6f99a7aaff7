//! Redacta command line front-end.
//!
//! Redacts text, retrains the model and evaluates it, printing results as
//! JSON on stdout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use redacta::{
    CancellationToken, EvaluateRequest, LabeledExample, RedactResponse, RedactionService,
    ServiceConfig, TrainRequest, load_dataset,
};

/// CLI arguments
#[derive(Parser)]
#[command(name = "redacta")]
#[command(about = "Redact PII from text and train the NER model behind it")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON service configuration file
    #[arg(short, long, env = "REDACTA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the trained model
    #[arg(short, long, env = "REDACTA_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Default training dataset
    #[arg(short, long, env = "REDACTA_DATASET")]
    dataset: Option<PathBuf>,

    /// Inference timeout in milliseconds
    #[arg(long, env = "REDACTA_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace detected entities with [LABEL] placeholders
    Redact {
        /// Text to redact (read from stdin when omitted)
        text: Option<String>,
    },
    /// Train the model and persist it
    Train {
        /// JSON examples to train on (the configured dataset when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Passes over the examples
        #[arg(short = 'n', long)]
        iterations: Option<usize>,
    },
    /// Score the model against annotated examples
    Evaluate {
        /// JSON test examples
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Test files hold a bare array or an evaluate request.
#[derive(Deserialize)]
#[serde(untagged)]
enum TestFile {
    Examples(Vec<LabeledExample>),
    Request(EvaluateRequest),
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(model_dir) = &cli.model_dir {
        config = config.with_model_dir(model_dir);
    }
    if let Some(dataset) = &cli.dataset {
        config = config.with_dataset_path(dataset);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_inference_timeout(Duration::from_millis(timeout_ms));
    }
    Ok(config)
}

fn load_test_data(path: &Path) -> Result<Vec<LabeledExample>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let test_data = match serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?
    {
        TestFile::Examples(examples) => examples,
        TestFile::Request(request) => request.test_data,
    };
    Ok(test_data)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let service = RedactionService::from_config(config).context("loading model")?;

    match cli.command {
        Commands::Redact { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("reading stdin")?;
                    buf
                }
            };
            let redacted_text = service.redact(&text).await?;
            print_json(&RedactResponse { redacted_text })?;
        }
        Commands::Train { input, iterations } => {
            let training_data = match input {
                Some(path) => load_dataset(&path)
                    .with_context(|| format!("loading training data from {}", path.display()))?,
                None => Vec::new(),
            };

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling training");
                    on_interrupt.cancel();
                }
            });

            let report = service
                .train(
                    TrainRequest {
                        training_data,
                        iterations,
                    },
                    cancel,
                )
                .await
                .context("training failed")?;
            info!("{}", report.message);
            print_json(&report)?;
        }
        Commands::Evaluate { input } => {
            let test_data = load_test_data(&input)?;
            let metrics = service
                .evaluate(EvaluateRequest { test_data })
                .await
                .context("evaluation failed")?;
            print_json(&metrics)?;
        }
    }

    Ok(())
}
