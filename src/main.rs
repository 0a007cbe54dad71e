//! BuildPulse - analytics engine for building sensor time-series
//!
//! A CLI harness around a stateless analytics engine: it reads a JSON
//! analysis request, runs one of the registered routines and writes
//! the structured JSON response.
//!
//! Exit codes:
//!   0 - Success (analysis ran, response written)
//!   1 - Runtime error (IO, config, or a routine failure)
//!   2 - Request rejected by validation (bad JSON, missing or unknown
//!       analysis_type, empty payload)

mod analysis;
mod cli;
mod config;
mod dispatch;
mod models;
mod normalize;
mod stats;

use analysis::{AnalysisKind, Catalog};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use cli::Args;
use config::Config;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        match handle_init_config() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Handle --list-analyses early
    if args.list_analyses {
        for kind in AnalysisKind::ALL {
            println!("{}", kind);
        }
        std::process::exit(0);
    }

    // Initialize logging
    init_logging(&args);

    info!("BuildPulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Analysis run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .buildpulse.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(".buildpulse.toml");

    if path.exists() {
        eprintln!(".buildpulse.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .buildpulse.toml")?;

    println!("Created .buildpulse.toml with default settings.");
    println!("Edit it to customize thresholds, sensor keys and ranges.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one analysis request end to end. Returns the process exit code.
fn run(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // The evaluation instant: injected via --as-of, otherwise the
    // local wall clock read exactly once. Time-relative routines only
    // ever see this value.
    let now = resolve_instant(&args);
    debug!("Evaluation instant: {}", now);

    // The registry is built once from configuration and passed by
    // reference into the dispatcher.
    let catalog = Catalog::new(config.analytics.clone());

    // Read the request body
    let body = read_request(&args)?;

    // Dispatch
    let (response, exit_code) = match dispatch::handle_request(&catalog, &body, now) {
        Ok(response) => (response, 0),
        Err(e) => {
            let code = if e.is_validation() { 2 } else { 1 };
            warn!(error = %e, "Request did not produce results");
            (e.to_body(), code)
        }
    };

    // Serialize and write the response
    let rendered = if config.general.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    write_response(&config.general.output, &rendered)?;

    Ok(exit_code)
}

/// Resolve the evaluation instant from --as-of or the wall clock.
fn resolve_instant(args: &Args) -> NaiveDateTime {
    args.as_of
        .as_deref()
        .and_then(models::parse_timestamp)
        .unwrap_or_else(|| chrono::Local::now().naive_local())
}

/// Read the request body from the input file or stdin.
fn read_request(args: &Args) -> Result<String> {
    let input = args
        .input
        .as_ref()
        .context("No input file provided")?;

    if input.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read request from stdin")?;
        Ok(body)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read request file: {}", input.display()))
    }
}

/// Write the response to the configured output, stdout by default.
fn write_response(output: &str, rendered: &str) -> Result<()> {
    if output.is_empty() {
        println!("{}", rendered);
    } else {
        std::fs::write(output, rendered)
            .with_context(|| format!("Failed to write response to {}", output))?;
        info!("Response written to {}", output);
    }
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .buildpulse.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
