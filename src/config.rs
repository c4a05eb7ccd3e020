//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.obstacle-eval.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".obstacle-eval.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Distance bucket settings.
    #[serde(default)]
    pub binning: BinningConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory that receives one subdirectory per run.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of ingestion workers.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Abort on the first unreadable recording instead of skipping it.
    #[serde(default)]
    pub strict: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
            jobs: default_jobs(),
            strict: false,
        }
    }
}

fn default_output_dir() -> String {
    "evaluation_results".to_string()
}

fn default_jobs() -> usize {
    1
}

/// Distance bucket layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Distances at or beyond this land in the last bucket (meters).
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Width of each bucket (meters).
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            resolution: default_resolution(),
        }
    }
}

fn default_max_distance() -> f64 {
    4.0
}

fn default_resolution() -> f64 {
    0.5
}

/// Report generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Print the per-file frequency table.
    #[serde(default = "default_true")]
    pub per_file_table: bool,

    /// Print the recording duration table.
    #[serde(default = "default_true")]
    pub duration_table: bool,

    /// Write one file list per bucket.
    #[serde(default = "default_true")]
    pub bin_file_lists: bool,

    /// Write the per-file CSV export.
    #[serde(default = "default_true")]
    pub csv_export: bool,

    /// Write the JSON summary.
    #[serde(default = "default_true")]
    pub json_export: bool,

    /// Point `<output_dir>/latest` at the newest run.
    #[serde(default = "default_true")]
    pub link_latest: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            per_file_table: true,
            duration_table: true,
            bin_file_lists: true,
            csv_export: true,
            json_export: true,
            link_latest: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(max_distance) = args.max_distance {
            self.binning.max_distance = max_distance;
        }
        if let Some(resolution) = args.resolution {
            self.binning.resolution = resolution;
        }

        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = output_dir.display().to_string();
        }
        if let Some(jobs) = args.jobs {
            self.general.jobs = jobs;
        }

        // Flags only ever switch behaviour on (or features off)
        if args.verbose {
            self.general.verbose = true;
        }
        if args.strict {
            self.general.strict = true;
        }
        if args.no_per_file {
            self.report.per_file_table = false;
        }
        if args.no_export {
            self.report.csv_export = false;
            self.report.json_export = false;
            self.report.bin_file_lists = false;
        }
        if args.no_link {
            self.report.link_latest = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
