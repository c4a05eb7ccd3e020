//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// obstacle-eval - distance-binned obstacle statistics
///
/// Reads one JSON document per recording, buckets every obstacle by the
/// distance at which it was first seen, and writes summary tables, a text
/// report and a per-file CSV export.
///
/// Examples:
///   obstacle-eval ./recordings
///   obstacle-eval ./recordings --max-distance 6 --resolution 0.25
///   obstacle-eval ./recordings --jobs 8 --output-dir results
///   obstacle-eval ./recordings --dry-run
///   obstacle-eval --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory containing the recording JSON documents
    #[arg(value_name = "DATA_DIR", required_unless_present = "init_config")]
    pub data: Option<PathBuf>,

    /// Maximum distance for evaluation (meters)
    ///
    /// Obstacles at or beyond this distance are counted in the last bucket.
    #[arg(long, value_name = "METERS", env = "OBSTACLE_EVAL_MAX_DISTANCE")]
    pub max_distance: Option<f64>,

    /// Width of each distance bucket (meters)
    #[arg(long, value_name = "METERS", env = "OBSTACLE_EVAL_RESOLUTION")]
    pub resolution: Option<f64>,

    /// Directory receiving one subdirectory per run
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .obstacle-eval.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of parallel ingestion workers
    #[arg(short, long, value_name = "NUM")]
    pub jobs: Option<usize>,

    /// Abort on the first unreadable or malformed recording
    #[arg(long)]
    pub strict: bool,

    /// Skip the per-file frequency table on the console
    #[arg(long)]
    pub no_per_file: bool,

    /// Only write the text report (no CSV, JSON or bucket file lists)
    #[arg(long)]
    pub no_export: bool,

    /// Do not update the `latest` link in the output directory
    #[arg(long)]
    pub no_link: bool,

    /// Dry run: list the documents that would be read and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .obstacle-eval.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The data directory (validated to be present unless --init-config).
    pub fn data_dir(&self) -> PathBuf {
        self.data.clone().unwrap_or_default()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.data {
            Some(ref data) if !data.exists() => {
                return Err(format!("Data directory does not exist: {}", data.display()));
            }
            Some(ref data) if !data.is_dir() => {
                return Err(format!("Data path is not a directory: {}", data.display()));
            }
            Some(_) => {}
            None => return Err("A data directory is required".to_string()),
        }

        if let Some(max_distance) = self.max_distance {
            if !max_distance.is_finite() || max_distance <= 0.0 {
                return Err("Max distance must be a positive number".to_string());
            }
        }

        if let Some(resolution) = self.resolution {
            if !resolution.is_finite() || resolution <= 0.0 {
                return Err("Resolution must be a positive number".to_string());
            }
        }

        if self.jobs == Some(0) {
            return Err("Jobs must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from the configuration file; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
