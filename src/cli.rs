//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// BuildPulse - statistical analytics for building sensor time-series
///
/// Run one of the registered analyses over a JSON request and print
/// the structured response.
///
/// Examples:
///   buildpulse --input request.json
///   buildpulse --input - < request.json
///   buildpulse --input request.json --as-of "2025-02-10 12:00:00"
///   buildpulse --list-analyses
///   buildpulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Request file to analyze; "-" reads from stdin
    ///
    /// The request is a JSON object with a required `analysis_type`
    /// field, an optional `params` object and the sensor payload in
    /// the remaining fields. Not required with --init-config or
    /// --list-analyses.
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["init_config", "list_analyses"]
    )]
    pub input: Option<PathBuf>,

    /// Output file for the response; defaults to stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Pretty-print the JSON response
    #[arg(short, long)]
    pub pretty: bool,

    /// Evaluation instant for time-relative analyses
    ///
    /// Format: "YYYY-MM-DD HH:MM:SS". Defaults to the current local
    /// time, read once at startup. Can also be set via BUILDPULSE_AS_OF.
    #[arg(long, value_name = "TIMESTAMP", env = "BUILDPULSE_AS_OF")]
    pub as_of: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .buildpulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List the registered analysis types and exit
    #[arg(long)]
    pub list_analyses: bool,

    /// Generate a default .buildpulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for the fast paths.
        if self.init_config || self.list_analyses {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref raw) = self.as_of {
            if crate::models::parse_timestamp(raw).is_none() {
                return Err(format!(
                    "Invalid --as-of timestamp '{}': expected \"YYYY-MM-DD HH:MM:SS\"",
                    raw
                ));
            }
        }

        if let Some(ref input) = self.input {
            if input.as_os_str() != "-" && !input.exists() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: Some(PathBuf::from("-")),
            output: None,
            pretty: false,
            as_of: None,
            config: None,
            verbose: false,
            quiet: false,
            list_analyses: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_ok_for_stdin() {
        let args = make_args();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_bad_as_of() {
        let mut args = make_args();
        args.as_of = Some("next tuesday".to_string());
        assert!(args.validate().is_err());

        args.as_of = Some("2025-02-10 12:00:00".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_input_file() {
        let mut args = make_args();
        args.input = Some(PathBuf::from("/definitely/not/here.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_fast_paths_skip_validation() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        args.list_analyses = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
