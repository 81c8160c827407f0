use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use emotion_classifier::classifier::OnnxClassifier;
use emotion_classifier::config::{Device, FatalConfigError, PipelineConfig};
use emotion_classifier::pipeline::Pipeline;
use emotion_classifier::server::{self, AppState};

/// Web demo that classifies the emotion of a spoken audio clip
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the trained classifier (.onnx)
    #[arg(short, long, default_value = "models/emotion_cnn.onnx")]
    model: PathBuf,

    /// Port for the web UI
    #[arg(short, long, default_value = "7860")]
    port: u16,

    /// Number of threads for classifier inference
    #[arg(long, default_value = "2")]
    threads: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!("Audio emotion classifier starting...");
    info!("Model: {:?}", args.model);

    if !args.model.exists() {
        error!("Model file not found: {:?}", args.model);
        eprintln!("\nModel file not found: {:?}", args.model);
        eprintln!("\nExport the trained classifier to ONNX and place it at the expected");
        eprintln!("location, or specify a custom path with: --model /path/to/model.onnx");
        return Err(FatalConfigError::ModelNotFound(args.model).into());
    }

    let config = PipelineConfig::default();

    // A bad artifact must stop the server before it accepts any request
    info!("Loading classifier...");
    let classifier = OnnxClassifier::load(&args.model, &config, Device::Cpu, args.threads)?;
    info!("Classifier loaded successfully");

    let pipeline = Pipeline::new(config, Arc::new(classifier))?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    server::serve(state, args.port).await
}
