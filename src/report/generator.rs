//! Report generation.
//!
//! Renders a finalized aggregation state as a plain-text report, a CSV
//! export with one row per recording, a JSON summary, per-bucket file lists,
//! and the console view. `render_*` functions return the content; `write_*`
//! functions stream it into any writer and `save_*` functions into a file.

use crate::analysis::AggregationState;
use crate::error::{EvalError, EvalResult};
use crate::models::BinEntry;
use crate::report::tables::{
    bucket_ranges, duration_table, free_file_summary, overall_stats_table,
    per_file_frequencies, per_file_frequency_table, summary_table, unique_free_file_names,
    BucketRange, OverallStats,
};
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Separator between the higher and dropoff count in an exported cell.
pub const EXPORT_CELL_SEPARATOR: &str = "|";

const SECTION_RULE_WIDTH: usize = 40;

/// Generate the plain-text report.
///
/// Sections: bucket distribution, overall statistics, obstacle-free files.
/// The output is a pure function of the state.
pub fn render_text_report(state: &AggregationState) -> String {
    if state.num_buckets() == 0 {
        return String::new();
    }

    let rule = "=".repeat(SECTION_RULE_WIDTH);
    let mut output = String::new();

    output.push_str("Obstacle Distribution by Distance Bin\n");
    output.push_str(&rule);
    output.push('\n');
    output.push_str(&format!(
        "{:<20}{:<20}{:<20}\n",
        "Bin Range (m)", "Higher Obstacle", "Dropoff"
    ));
    for (i, range) in bucket_ranges(state).iter().enumerate() {
        output.push_str(&format!(
            "{}    {:<20}{:<20}\n",
            range.label(),
            state.higher_counts()[i],
            state.dropoff_counts()[i]
        ));
    }

    let stats = OverallStats::from_state(state);
    output.push_str("\nOverall Obstacle Statistics\n");
    output.push_str(&rule);
    output.push('\n');
    output.push_str(&format!("Total Obstacles: {}\n", stats.total));
    output.push_str(&format!("Higher Obstacles: {}\n", stats.higher));
    output.push_str(&format!("Dropoff Obstacles: {}\n", stats.dropoff));
    output.push_str(&format!("Both (Higher & Dropoff): {}\n", stats.both));

    let free = free_file_summary(state);
    output.push_str("\nObstacle-Free Files\n");
    output.push_str(&rule);
    output.push('\n');
    output.push_str(&free.message());
    output.push('\n');
    for name in free.names {
        output.push_str(name);
        output.push('\n');
    }

    output
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Generate the CSV export: one row per recording with at least one higher
/// or dropoff observation.
///
/// Columns: file name, one `higher|dropoff` cell per bucket, total higher,
/// total dropoff, grand total.
pub fn render_tabular_export(state: &AggregationState) -> String {
    let ranges = bucket_ranges(state);
    if ranges.is_empty() {
        return String::new();
    }

    let mut header = vec!["File".to_string()];
    header.extend(ranges.iter().map(BucketRange::compact_label));
    header.extend(
        ["Total Higher", "Total Dropoff", "Grand Total"]
            .iter()
            .map(|s| s.to_string()),
    );

    let mut output = header.join(",");
    output.push('\n');

    for freq in per_file_frequencies(state) {
        let mut row = vec![csv_field(&freq.file_name)];
        row.extend(
            freq.higher
                .iter()
                .zip(&freq.dropoff)
                .map(|(h, d)| format!("{}{}{}", h, EXPORT_CELL_SEPARATOR, d)),
        );
        row.push(freq.total_higher().to_string());
        row.push(freq.total_dropoff().to_string());
        row.push(freq.total().to_string());
        output.push_str(&row.join(","));
        output.push('\n');
    }

    output
}

#[derive(Debug, Serialize)]
struct BucketSummary {
    #[serde(flatten)]
    range: BucketRange,
    higher: usize,
    dropoff: usize,
}

#[derive(Debug, Serialize)]
struct Diagnostics {
    too_short_observations: usize,
    anomalous_observations: usize,
}

#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    max_distance: f64,
    resolution: f64,
    num_buckets: usize,
    files_considered: usize,
    buckets: Vec<BucketSummary>,
    overall: OverallStats,
    obstacle_free_files: Vec<&'a str>,
    both_type_entries: &'a [BinEntry],
    diagnostics: Diagnostics,
}

/// Generate a JSON summary of the state.
pub fn render_json_summary(state: &AggregationState) -> Result<String> {
    let buckets = bucket_ranges(state)
        .into_iter()
        .enumerate()
        .map(|(i, range)| BucketSummary {
            range,
            higher: state.higher_counts()[i],
            dropoff: state.dropoff_counts()[i],
        })
        .collect();

    let summary = JsonSummary {
        max_distance: state.max_distance(),
        resolution: state.resolution(),
        num_buckets: state.num_buckets(),
        files_considered: state.num_files(),
        buckets,
        overall: OverallStats::from_state(state),
        obstacle_free_files: unique_free_file_names(state),
        both_type_entries: state.both_entries(),
        diagnostics: Diagnostics {
            too_short_observations: state.too_short_count(),
            anomalous_observations: state.anomaly_count(),
        },
    };

    serde_json::to_string_pretty(&summary).map_err(Into::into)
}

fn entry_lines(entries: &[BinEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}\t{}\n", e.file_name, e.start_frame))
        .collect()
}

/// Per-bucket lists of `file<TAB>start_frame`, as `(file name, content)`
/// pairs. Empty buckets produce no list.
pub fn render_bin_file_lists(state: &AggregationState) -> Vec<(String, String)> {
    let mut lists = Vec::new();

    for (i, range) in bucket_ranges(state).iter().enumerate() {
        let label = range.compact_label();
        let higher = &state.higher_entries()[i];
        if !higher.is_empty() {
            lists.push((format!("higher_{}m.txt", label), entry_lines(higher)));
        }
        let dropoff = &state.dropoff_entries()[i];
        if !dropoff.is_empty() {
            lists.push((format!("dropoff_{}m.txt", label), entry_lines(dropoff)));
        }
    }

    if state.num_buckets() > 0 && !state.both_entries().is_empty() {
        lists.push(("both.txt".to_string(), entry_lines(state.both_entries())));
    }

    lists
}

/// Which optional tables the console view includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleOptions {
    pub per_file_table: bool,
    pub duration_table: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            per_file_table: true,
            duration_table: true,
        }
    }
}

/// Generate the human-readable console view.
pub fn render_console(state: &AggregationState, options: ConsoleOptions) -> String {
    if state.num_buckets() == 0 {
        return String::new();
    }

    let mut output = String::new();

    output.push_str(&summary_table(state).to_string());
    output.push('\n');
    output.push_str(&overall_stats_table(state).to_string());

    output.push_str("\nObstacle-Free Files\n\n");
    output.push_str(&free_file_summary(state).message());
    output.push('\n');

    if options.per_file_table {
        let table = per_file_frequency_table(state);
        if !table.rows.is_empty() {
            output.push('\n');
            output.push_str(&table.to_string());
        }
    }

    if options.duration_table {
        let table = duration_table(state);
        if !table.is_empty() {
            output.push('\n');
            output.push_str(&table.to_string());
        }
    }

    if state.too_short_count() > 0 || state.anomaly_count() > 0 {
        output.push_str(&format!(
            "\nSkipped observations: {} shorter than the frame threshold, {} without a type\n",
            state.too_short_count(),
            state.anomaly_count()
        ));
    }

    output
}

/// Stream the text report into a writer.
#[allow(dead_code)] // Alternative to save_text_report for in-memory sinks
pub fn write_text_report<W: Write>(state: &AggregationState, dest: &mut W) -> std::io::Result<()> {
    dest.write_all(render_text_report(state).as_bytes())
}

/// Stream the CSV export into a writer.
#[allow(dead_code)] // Alternative to save_tabular_export for in-memory sinks
pub fn write_tabular_export<W: Write>(
    state: &AggregationState,
    dest: &mut W,
) -> std::io::Result<()> {
    dest.write_all(render_tabular_export(state).as_bytes())
}

/// Write content to a file, creating or truncating it.
pub fn save_to_path(path: &Path, content: &str) -> EvalResult<()> {
    let mut file = std::fs::File::create(path).map_err(|e| EvalError::write(path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| EvalError::write(path, e))
}

/// Write the text report to a file.
pub fn save_text_report(state: &AggregationState, path: &Path) -> EvalResult<()> {
    save_to_path(path, &render_text_report(state))
}

/// Write the CSV export to a file.
pub fn save_tabular_export(state: &AggregationState, path: &Path) -> EvalResult<()> {
    save_to_path(path, &render_tabular_export(state))
}

/// Write the per-bucket lists into `dir`, creating it if needed.
pub fn save_bin_file_lists(state: &AggregationState, dir: &Path) -> EvalResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| EvalError::write(dir, e))?;

    let mut written = Vec::new();
    for (name, content) in render_bin_file_lists(state) {
        let path = dir.join(name);
        save_to_path(&path, &content)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Aggregator;
    use crate::models::{ObservedObstacle, RecordingFile};

    fn obstacle(distance: f64, higher: bool, dropoff: bool, start: i64, end: i64) -> ObservedObstacle {
        ObservedObstacle {
            distance,
            is_higher_obstacle: higher,
            is_dropoff: dropoff,
            start_frame: start,
            end_frame: end,
        }
    }

    fn create_test_state() -> AggregationState {
        let mut agg = Aggregator::configure(1.0, 0.5, 2).unwrap();
        agg.ingest(&RecordingFile::new(
            "A",
            vec![
                obstacle(0.3, true, false, 0, 10),
                obstacle(3.9, false, true, 5, 9),
            ],
        ));
        agg.ingest(&RecordingFile::new("B", Vec::new()));
        agg.finish()
    }

    #[test]
    fn test_text_report_golden() {
        let state = create_test_state();
        let expected = concat!(
            "Obstacle Distribution by Distance Bin\n",
            "========================================\n",
            "Bin Range (m)       Higher Obstacle     Dropoff             \n",
            "0.00 - 0.50    1                   0                   \n",
            "0.50 - 1.00    0                   1                   \n",
            "\n",
            "Overall Obstacle Statistics\n",
            "========================================\n",
            "Total Obstacles: 2\n",
            "Higher Obstacles: 1\n",
            "Dropoff Obstacles: 1\n",
            "Both (Higher & Dropoff): 0\n",
            "\n",
            "Obstacle-Free Files\n",
            "========================================\n",
            "1 out of 2 files had no obstacles.\n",
            "B\n",
        );

        assert_eq!(render_text_report(&state), expected);
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let state = create_test_state();
        assert_eq!(render_text_report(&state), render_text_report(&state));
        assert_eq!(render_tabular_export(&state), render_tabular_export(&state));
        assert_eq!(
            render_console(&state, ConsoleOptions::default()),
            render_console(&state, ConsoleOptions::default())
        );
        assert_eq!(
            render_json_summary(&state).unwrap(),
            render_json_summary(&state).unwrap()
        );

        let mut first = Vec::new();
        let mut second = Vec::new();
        write_text_report(&state, &mut first).unwrap();
        write_text_report(&state, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_tabular_export_format() {
        let mut agg = Aggregator::configure(1.0, 0.5, 2).unwrap();
        agg.ingest(&RecordingFile::new(
            "drive,1",
            vec![
                obstacle(0.1, true, false, 0, 10),
                obstacle(0.2, false, true, 0, 10),
                obstacle(0.7, false, true, 20, 30),
            ],
        ));
        agg.ingest(&RecordingFile::new(
            "drive_0",
            vec![obstacle(0.9, true, false, 0, 10)],
        ));
        let state = agg.finish();

        let csv = render_tabular_export(&state);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "File,0.00-0.50,0.50-1.00,Total Higher,Total Dropoff,Grand Total"
        );
        assert_eq!(lines[1], "\"drive,1\",1|1,0|1,1,2,3");
        assert_eq!(lines[2], "drive_0,0|0,1|0,1,0,1");
        assert_eq!(lines.len(), 3);
        assert!(!csv.contains(" | "));
    }

    #[test]
    fn test_json_summary_shape() {
        let state = create_test_state();
        let json = render_json_summary(&state).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["num_buckets"], 2);
        assert_eq!(value["buckets"][0]["start"], 0.0);
        assert_eq!(value["buckets"][1]["dropoff"], 1);
        assert_eq!(value["overall"]["total"], 2);
        assert_eq!(value["obstacle_free_files"][0], "B");
    }

    #[test]
    fn test_bin_file_lists() {
        let mut agg = Aggregator::configure(1.0, 0.5, 1).unwrap();
        agg.ingest(&RecordingFile::new(
            "rec",
            vec![
                obstacle(0.1, true, false, 4, 10),
                obstacle(0.2, true, false, 40, 50),
                obstacle(0.6, true, true, 60, 70),
            ],
        ));
        let state = agg.finish();

        let lists = render_bin_file_lists(&state);
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].0, "higher_0.00-0.50m.txt");
        assert_eq!(lists[0].1, "rec\t4\nrec\t40\n");
        assert_eq!(lists[1].0, "both.txt");
    }

    #[test]
    fn test_console_view() {
        let state = create_test_state();
        let console = render_console(&state, ConsoleOptions::default());

        assert!(console.contains("Obstacle Distribution by Distance Bin"));
        assert!(console.contains("Overall Obstacle Statistics"));
        assert!(console.contains("1 out of 2 files had no obstacles."));
        assert!(console.contains("Obstacle Frequency per File"));
        assert!(console.contains("1 | 0"));
        assert!(!console.contains("Recording Durations"));

        let compact = render_console(
            &state,
            ConsoleOptions {
                per_file_table: false,
                duration_table: false,
            },
        );
        assert!(!compact.contains("Obstacle Frequency per File"));
    }

    #[test]
    fn test_empty_state_renders_nothing() {
        let state = AggregationState::default();
        assert_eq!(render_text_report(&state), "");
        assert_eq!(render_tabular_export(&state), "");
        assert_eq!(render_console(&state, ConsoleOptions::default()), "");
        assert!(render_bin_file_lists(&state).is_empty());
    }

    #[test]
    fn test_save_reports() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state();

        let report = dir.path().join("report.txt");
        save_text_report(&state, &report).unwrap();
        assert_eq!(
            std::fs::read_to_string(&report).unwrap(),
            render_text_report(&state)
        );

        let written = save_bin_file_lists(&state, &dir.path().join("bins")).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state();
        let path = dir.path().join("missing").join("report.txt");

        let err = save_tabular_export(&state, &path).unwrap_err();
        assert!(matches!(err, EvalError::DestinationWrite { .. }));
    }
}
