//! Tabular views over a finalized aggregation state.
//!
//! Every builder here is a pure function of the state. A state without
//! buckets yields empty tables rather than an error.

use crate::analysis::AggregationState;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Separator between the higher and dropoff count in a display cell.
pub const DISPLAY_CELL_SEPARATOR: &str = " | ";

/// A display-ready distance interval, rounded to centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketRange {
    pub start: f64,
    pub end: f64,
}

impl BucketRange {
    /// Label used in tables and the text report, e.g. `0.50 - 1.00`.
    pub fn label(&self) -> String {
        format!("{:.2} - {:.2}", self.start, self.end)
    }

    /// Label without spaces, used for column headers and file names.
    pub fn compact_label(&self) -> String {
        format!("{:.2}-{:.2}", self.start, self.end)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Bucket intervals in ascending order.
///
/// The width is derived from `max_distance / num_buckets`, not from the
/// configured resolution.
pub fn bucket_ranges(state: &AggregationState) -> Vec<BucketRange> {
    let n = state.num_buckets();
    if n == 0 {
        return Vec::new();
    }
    let width = state.max_distance() / n as f64;
    (0..n)
        .map(|i| BucketRange {
            start: round2(i as f64 * width),
            end: round2((i + 1) as f64 * width),
        })
        .collect()
}

/// A titled grid of strings with an optional footer row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub footer: Option<Vec<String>>,
}

impl Table {
    pub fn new(title: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            title: title.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            footer: None,
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.footer.is_none()
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in self.rows.iter().chain(self.footer.iter()) {
            for (i, cell) in row.iter().enumerate() {
                let len = cell.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(len),
                    None => widths.push(len),
                }
            }
        }
        widths
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    let line = widths
        .iter()
        .enumerate()
        .map(|(i, width)| {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            format!("{:^width$}", cell, width = *width)
        })
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(f, "{}", line.trim_end())
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }

        let widths = self.column_widths();
        let rule_width = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        let rule = "─".repeat(rule_width.max(self.title.chars().count()));

        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", rule)?;
        write_row(f, &self.headers, &widths)?;
        writeln!(f, "{}", rule)?;
        for row in &self.rows {
            write_row(f, row, &widths)?;
        }
        if let Some(ref footer) = self.footer {
            writeln!(f, "{}", rule)?;
            write_row(f, footer, &widths)?;
        }
        writeln!(f, "{}", rule)
    }
}

/// Higher and dropoff counts per bucket.
pub fn summary_table(state: &AggregationState) -> Table {
    let mut table = Table::new(
        "Obstacle Distribution by Distance Bin",
        &["Bin Range (m)", "Higher Obstacle Count", "Dropoff Count"],
    );
    for (i, range) in bucket_ranges(state).iter().enumerate() {
        table.push_row(vec![
            range.label(),
            state.higher_counts()[i].to_string(),
            state.dropoff_counts()[i].to_string(),
        ]);
    }
    table
}

/// Obstacle totals by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverallStats {
    pub total: usize,
    pub higher: usize,
    pub dropoff: usize,
    pub both: usize,
}

impl OverallStats {
    pub fn from_state(state: &AggregationState) -> Self {
        let higher = state.total_higher();
        let dropoff = state.total_dropoff();
        let both = state.both_count();
        Self {
            total: higher + dropoff + both,
            higher,
            dropoff,
            both,
        }
    }

    /// The total equals the sum of the three categories.
    pub fn is_consistent(&self) -> bool {
        self.total == self.higher + self.dropoff + self.both
    }
}

/// Four rows: total, higher, dropoff, both.
pub fn overall_stats_table(state: &AggregationState) -> Table {
    let mut table = Table::new("Overall Obstacle Statistics", &["Type", "Count"]);
    if state.num_buckets() == 0 {
        return table;
    }

    let stats = OverallStats::from_state(state);
    debug_assert!(stats.is_consistent());
    table.push_row(vec!["Total Obstacles".to_string(), stats.total.to_string()]);
    table.push_row(vec!["Higher Obstacles".to_string(), stats.higher.to_string()]);
    table.push_row(vec!["Dropoff Obstacles".to_string(), stats.dropoff.to_string()]);
    table.push_row(vec![
        "Both (Higher & Dropoff)".to_string(),
        stats.both.to_string(),
    ]);
    table
}

/// Per-bucket counts attributed to one recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFrequency {
    pub file_name: String,
    pub higher: Vec<usize>,
    pub dropoff: Vec<usize>,
}

impl FileFrequency {
    pub fn total_higher(&self) -> usize {
        self.higher.iter().sum()
    }

    pub fn total_dropoff(&self) -> usize {
        self.dropoff.iter().sum()
    }

    pub fn total(&self) -> usize {
        self.total_higher() + self.total_dropoff()
    }
}

/// Per-file counts for every file with at least one higher or dropoff
/// observation, sorted by file name.
///
/// Both-type observations carry no bucket and are not attributed here.
pub fn per_file_frequencies(state: &AggregationState) -> Vec<FileFrequency> {
    let n = state.num_buckets();
    let mut by_file: BTreeMap<&str, FileFrequency> = BTreeMap::new();

    let buckets = state
        .higher_entries()
        .iter()
        .map(|entries| (true, entries))
        .enumerate()
        .chain(
            state
                .dropoff_entries()
                .iter()
                .map(|entries| (false, entries))
                .enumerate(),
        );

    for (bucket, (is_higher, entries)) in buckets {
        for entry in entries {
            let freq = by_file
                .entry(entry.file_name.as_str())
                .or_insert_with(|| FileFrequency {
                    file_name: entry.file_name.clone(),
                    higher: vec![0; n],
                    dropoff: vec![0; n],
                });
            if is_higher {
                freq.higher[bucket] += 1;
            } else {
                freq.dropoff[bucket] += 1;
            }
        }
    }

    by_file.into_values().filter(|f| f.total() > 0).collect()
}

fn display_cell(higher: usize, dropoff: usize) -> String {
    format!("{}{}{}", higher, DISPLAY_CELL_SEPARATOR, dropoff)
}

/// One row per file, one `higher | dropoff` column per bucket, a Total
/// column, and a Total footer row.
pub fn per_file_frequency_table(state: &AggregationState) -> Table {
    let ranges = bucket_ranges(state);
    let mut headers: Vec<String> = vec!["File".to_string()];
    headers.extend(ranges.iter().map(BucketRange::compact_label));
    headers.push("Total".to_string());

    let mut table = Table {
        title: "Obstacle Frequency per File (higher | dropoff)".to_string(),
        headers,
        rows: Vec::new(),
        footer: None,
    };
    if ranges.is_empty() {
        return table;
    }

    let frequencies = per_file_frequencies(state);
    let n = ranges.len();
    let mut column_higher = vec![0usize; n];
    let mut column_dropoff = vec![0usize; n];
    let mut grand_total = 0;

    for freq in &frequencies {
        let mut row = vec![freq.file_name.clone()];
        for i in 0..n {
            row.push(display_cell(freq.higher[i], freq.dropoff[i]));
            column_higher[i] += freq.higher[i];
            column_dropoff[i] += freq.dropoff[i];
        }
        row.push(freq.total().to_string());
        grand_total += freq.total();
        table.push_row(row);
    }

    let mut footer = vec!["Total".to_string()];
    footer.extend((0..n).map(|i| display_cell(column_higher[i], column_dropoff[i])));
    footer.push(grand_total.to_string());
    table.footer = Some(footer);

    table
}

/// Known, non-zero durations, first occurrence of each name wins.
pub fn unique_durations(state: &AggregationState) -> Vec<(String, f64)> {
    let mut seen = HashSet::new();
    state
        .durations()
        .iter()
        .filter(|entry| seen.insert(entry.file_name.as_str()))
        .filter(|entry| entry.seconds.is_finite() && entry.seconds > 0.0)
        .map(|entry| (entry.file_name.clone(), entry.seconds))
        .collect()
}

/// Recording durations in minutes.
pub fn duration_table(state: &AggregationState) -> Table {
    let mut table = Table::new("Recording Durations", &["Recording", "Duration (min)"]);
    if state.num_buckets() == 0 {
        return table;
    }
    for (name, seconds) in unique_durations(state) {
        table.push_row(vec![name, format!("{:.2}", seconds / 60.0)]);
    }
    table
}

/// Obstacle-free recordings relative to all recordings considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeFileSummary<'a> {
    pub count: usize,
    /// `None` when the number of recordings considered is unknown.
    pub total_files: Option<usize>,
    pub names: Vec<&'a str>,
}

impl FreeFileSummary<'_> {
    pub fn message(&self) -> String {
        match self.total_files {
            Some(total) => format!("{} out of {} files had no obstacles.", self.count, total),
            None => format!("{} files had no obstacles.", self.count),
        }
    }
}

/// Obstacle-free recording names, first occurrence of each name wins.
pub fn unique_free_file_names(state: &AggregationState) -> Vec<&str> {
    let mut seen = HashSet::new();
    state
        .free_file_names()
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect()
}

pub fn free_file_summary(state: &AggregationState) -> FreeFileSummary<'_> {
    let names = unique_free_file_names(state);
    FreeFileSummary {
        count: names.len(),
        total_files: Some(state.num_files()).filter(|&n| n > 0),
        names,
    }
}
