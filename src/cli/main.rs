//! Photo operations CLI tool
//!
//! Runs one operation through the same request/response channel a mobile host
//! would use and prints the response as JSON on stdout.

use super::backend_factory::{CliBackend, CliBackendFactory};
use super::config::{parse_key_val, CliConfigBuilder};
use crate::{
    channel::{MethodCall, MethodHandler, MethodResponse, OperationChannel},
    dispatcher::{OperationDispatcher, RandomCoordinates},
    registry::{ModelLoadReport, ModelRegistry},
    tracing_config::TracingFormat,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Photo operations CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "photo-ops")]
pub struct Cli {
    /// Operation to run: initializeModels, removeBackground, applyFilter, addObject, removeObject
    #[arg(value_name = "OPERATION")]
    pub operation: String,

    /// Source image
    #[arg(short, long, value_name = "PATH")]
    pub image: Option<String>,

    /// Filter type for applyFilter (grayscale, color_reverse, popart)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Extra request parameter, repeatable (e.g. --param x=40 --param backgroundColor=#ffffff)
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Bundled model asset directory
    #[arg(long, value_name = "DIR")]
    pub assets: Option<PathBuf>,

    /// Directory for processed images
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file; other flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Inference backend
    #[arg(short, long, value_enum, default_value_t = CliBackend::Tract)]
    pub backend: CliBackend,

    /// Number of interpreter threads (0 = runtime default)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Load every declared model before running the operation
    #[arg(long)]
    pub init_models: bool,

    /// Seed for placeholder placement, for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON (requires the tracing-json feature)
    #[arg(long)]
    pub json_logs: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    info!(
        "Backend: {:?}, assets: {}, output: {}",
        cli.backend,
        config.assets_dir.display(),
        config.output_dir.display()
    );

    let loader = CliBackendFactory::create_loader(cli.backend, cli.threads)
        .context("Failed to create inference backend")?;
    let registry = Arc::new(ModelRegistry::from_config(&config, loader));
    let mut dispatcher =
        OperationDispatcher::new(config, registry).context("Failed to create dispatcher")?;
    if let Some(seed) = cli.seed {
        dispatcher = dispatcher.with_coordinates(RandomCoordinates::seeded(seed));
    }
    let channel = OperationChannel::new(Arc::new(dispatcher));

    if cli.init_models && cli.operation != "initializeModels" {
        let response = channel.handle(MethodCall::new("initializeModels")).await;
        let problems = initialization_problems(&response);
        if !problems.is_empty() {
            warn!("⚠️ Models not loaded: {}", problems.join(", "));
        }
    }

    let start_time = Instant::now();
    let response = channel.handle(CliConfigBuilder::method_call(&cli)).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to encode response")?
    );
    info!(
        "{} finished in {:.2}s",
        cli.operation,
        start_time.elapsed().as_secs_f64()
    );

    match response {
        MethodResponse::Success(_) => Ok(()),
        MethodResponse::Error { code, message, .. } => anyhow::bail!("{code}: {message}"),
        MethodResponse::NotImplemented => {
            anyhow::bail!("Operation '{}' is not implemented", cli.operation)
        },
    }
}

/// Models an `initializeModels` response reports as not loaded
fn initialization_problems(response: &MethodResponse) -> Vec<String> {
    match response {
        MethodResponse::Success(body) => {
            match serde_json::from_value::<ModelLoadReport>(body.clone()) {
                Ok(report) => report.failures().into_iter().map(str::to_string).collect(),
                Err(e) => vec![format!("unreadable model report ({e})")],
            }
        },
        MethodResponse::Error { code, message, .. } => vec![format!("{code}: {message}")],
        MethodResponse::NotImplemented => vec!["initializeModels is not implemented".to_string()],
    }
}

/// Initialize tracing based on verbosity and format flags
fn init_tracing(cli: &Cli) -> Result<()> {
    crate::tracing_config::init_cli_tracing(cli.verbose, tracing_format(cli.json_logs))
}

#[cfg(feature = "tracing-json")]
fn tracing_format(json_logs: bool) -> TracingFormat {
    if json_logs {
        TracingFormat::Json
    } else {
        TracingFormat::Console
    }
}

#[cfg(not(feature = "tracing-json"))]
fn tracing_format(json_logs: bool) -> TracingFormat {
    if json_logs {
        eprintln!("--json-logs needs the tracing-json feature; using compact logs");
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    }
}
