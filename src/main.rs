//! obstacle-eval - distance-binned obstacle statistics
//!
//! A CLI tool that reads per-recording obstacle detections, buckets them by
//! the distance at which each obstacle was first seen, and writes summary
//! tables, a text report and per-file exports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad configuration, rejected record in strict mode,
//!       unwritable output, etc.)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod output;
mod report;
mod scanner;

use analysis::{AggregationState, Aggregator};
use anyhow::{Context, Result};
use chrono::Local;
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use report::ConsoleOptions;
use scanner::{RecordScanner, ScanConfig, ScannedFile};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Configuration is read first so `[general] verbose` sets the log level
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("obstacle-eval v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_evaluation(args, config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Evaluation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default configuration file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize binning, exports and output location.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: could not install log subscriber: {}", e);
    }
}

/// Tally of the documents read during ingestion.
#[derive(Debug, Default, Clone, Copy)]
struct ReadStats {
    recordings: usize,
    rejected: usize,
}

/// Run the complete evaluation workflow. Returns the exit code.
fn run_evaluation(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();
    let data_dir = args.data_dir();

    // Step 1: Discover documents
    println!("📂 Scanning recordings in: {}", data_dir.display());
    let files = RecordScanner::new(data_dir.clone(), ScanConfig::default()).scan()?;
    info!("Found {} recording documents", files.len());

    // Bad bucket layouts fail before any document is read
    let aggregator = Aggregator::configure(
        config.binning.max_distance,
        config.binning.resolution,
        files.len(),
    )?;
    let bins = aggregator.config();

    if args.dry_run {
        return handle_dry_run(&files);
    }

    if files.is_empty() {
        warn!("No recording documents found in {}", data_dir.display());
    }

    // Step 2: Aggregate
    println!(
        "📊 Aggregating {} recordings into {} buckets of {} m (max {} m)...",
        files.len(),
        bins.num_buckets,
        bins.resolution,
        bins.max_distance
    );

    let progress = build_progress_bar(files.len(), args.quiet);
    let (state, stats) = aggregate(
        aggregator,
        &files,
        config.general.jobs,
        config.general.strict,
        &progress,
    )?;
    progress.finish_with_message("Aggregation complete");

    // Step 3: Console view
    if !args.quiet {
        let options = ConsoleOptions {
            per_file_table: config.report.per_file_table,
            duration_table: config.report.duration_table,
        };
        println!("\n{}", report::render_console(&state, options));
    }

    // Step 4: Write artefacts
    let output_root = PathBuf::from(&config.general.output_dir);
    let run_dir = output::create_run_dir(&output_root, &data_dir, Local::now())?;
    write_artefacts(&state, &config, &run_dir)?;

    if config.report.link_latest {
        if let Err(e) = output::link_latest(&output_root, &run_dir) {
            warn!("Could not update `latest` link: {}", e);
        }
    }

    let duration = start_time.elapsed().as_secs_f64();
    println!("\n📝 Summary:");
    println!(
        "   Recordings read: {} | Rejected: {}",
        stats.recordings, stats.rejected
    );
    println!("   Qualifying obstacles: {}", state.total_obstacles());
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Evaluation complete! Results saved to: {}",
        run_dir.display()
    );

    Ok(0)
}

/// Write the report files selected in the configuration into `run_dir`.
fn write_artefacts(state: &AggregationState, config: &Config, run_dir: &Path) -> Result<()> {
    let report_path = run_dir.join("report.txt");
    report::save_text_report(state, &report_path)?;
    info!("Wrote {}", report_path.display());

    if config.report.csv_export {
        let csv_path = run_dir.join("per_file.csv");
        report::save_tabular_export(state, &csv_path)?;
        info!("Wrote {}", csv_path.display());
    }

    if config.report.json_export {
        let json_path = run_dir.join("summary.json");
        let json = report::render_json_summary(state)?;
        report::save_to_path(&json_path, &json)?;
        info!("Wrote {}", json_path.display());
    }

    if config.report.bin_file_lists {
        let written = report::save_bin_file_lists(state, &run_dir.join("bins"))?;
        info!("Wrote {} bucket file lists", written.len());
    }

    Ok(())
}

/// Build the ingestion progress bar; hidden in quiet mode.
fn build_progress_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} recordings ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Read a contiguous run of documents into `aggregator`.
fn ingest_chunk(
    aggregator: &mut Aggregator,
    files: &[ScannedFile],
    strict: bool,
    progress: &ProgressBar,
) -> Result<ReadStats> {
    let mut stats = ReadStats::default();

    for file in files {
        match scanner::load_recording(&file.path) {
            Ok(recording) => {
                let outcome = aggregator.ingest(&recording);
                if outcome.obstacle_free {
                    debug!("{}: no obstacles", recording.name);
                }
                debug!(
                    "{}: {} counted, {} too short, {} anomalous",
                    recording.name,
                    outcome.counted,
                    outcome.too_short,
                    outcome.anomalies.len()
                );
                stats.recordings += 1;
            }
            Err(e) if strict => return Err(e.into()),
            Err(e) => {
                error!("Skipping recording: {}", e);
                stats.rejected += 1;
            }
        }
        progress.inc(1);
    }

    Ok(stats)
}

/// Ingest all documents, in parallel when more than one job is configured.
///
/// Each worker owns a private state; partial states are merged in input
/// order, so entry lists come out as in a sequential run.
fn aggregate(
    mut aggregator: Aggregator,
    files: &[ScannedFile],
    jobs: usize,
    strict: bool,
    progress: &ProgressBar,
) -> Result<(AggregationState, ReadStats)> {
    if jobs <= 1 || files.len() < 2 {
        let stats = ingest_chunk(&mut aggregator, files, strict, progress)?;
        return Ok((aggregator.finish(), stats));
    }

    let bins = aggregator.config();
    let expected_files = aggregator.state().num_files();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to build ingestion thread pool")?;
    let chunk_size = files.len().div_ceil(jobs);
    debug!("Ingesting with {} workers, {} documents per chunk", jobs, chunk_size);

    let partials: Vec<Result<(AggregationState, ReadStats)>> = pool.install(|| {
        files
            .par_chunks(chunk_size)
            .map(|chunk| -> Result<(AggregationState, ReadStats)> {
                let mut partial = Aggregator::from_config(bins, expected_files);
                let stats = ingest_chunk(&mut partial, chunk, strict, progress)?;
                Ok((partial.finish(), stats))
            })
            .collect()
    });

    let mut stats = ReadStats::default();
    for partial in partials {
        let (state, partial_stats) = partial?;
        aggregator.merge(state)?;
        stats.recordings += partial_stats.recordings;
        stats.rejected += partial_stats.rejected;
    }

    Ok((aggregator.finish(), stats))
}

/// Handle --dry-run: list discovered documents and exit.
fn handle_dry_run(files: &[ScannedFile]) -> Result<i32> {
    println!("\n🔍 Dry run: listing recording documents (nothing is aggregated)...\n");

    if files.is_empty() {
        println!("   No recording documents found.");
    } else {
        println!("   Found {} documents that would be read:\n", files.len());
        for file in files {
            println!("     📄 {} ({} bytes)", file.path.display(), file.size);
        }
        println!("\n   Total: {} documents", files.len());
    }

    println!("\n✅ Dry run complete. No reports were written.");
    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is installed, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}; using defaults", CONFIG_FILE_NAME, e);
            Ok(Config::default())
        }
    }
}
