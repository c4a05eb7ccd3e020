//! Obstacle aggregation by distance bucket and category.
//!
//! An [`Aggregator`] owns one [`AggregationState`] while recordings are
//! folded into it. [`Aggregator::finish`] hands the state out as a finalized
//! snapshot: every field is private and only read accessors are public, so
//! reporters cannot mutate it.

use crate::error::{EvalError, EvalResult};
use crate::models::{
    AnomalousObservation, BinEntry, Category, DurationEntry, IngestOutcome, RecordingFile,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Upper bound on the bucket count, so a typo in the resolution cannot
/// allocate millions of buckets.
pub const MAX_BUCKETS: usize = 10_000;

/// Validated bucket layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinConfig {
    pub max_distance: f64,
    pub resolution: f64,
    pub num_buckets: usize,
}

impl BinConfig {
    /// Validate `max_distance` and `resolution` and derive the bucket count.
    pub fn new(max_distance: f64, resolution: f64) -> EvalResult<Self> {
        if !max_distance.is_finite() || max_distance <= 0.0 {
            return Err(EvalError::configuration(format!(
                "max distance must be a positive number, got {}",
                max_distance
            )));
        }
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(EvalError::configuration(format!(
                "resolution must be a positive number, got {}",
                resolution
            )));
        }

        let whole_buckets = (max_distance / resolution).floor();
        if whole_buckets < 1.0 {
            return Err(EvalError::configuration(format!(
                "max distance {} with resolution {} yields no whole bucket",
                max_distance, resolution
            )));
        }
        if whole_buckets > MAX_BUCKETS as f64 {
            return Err(EvalError::configuration(format!(
                "max distance {} with resolution {} yields {} buckets (limit {})",
                max_distance, resolution, whole_buckets, MAX_BUCKETS
            )));
        }

        Ok(Self {
            max_distance,
            resolution,
            num_buckets: whole_buckets as usize,
        })
    }

    /// Bucket for a distance. Distances at or beyond `max_distance` land in
    /// the last bucket.
    pub fn bucket_index(&self, distance: f64) -> usize {
        // `as` saturates: negative distances and NaN map to 0.
        let raw = (distance / self.resolution).floor() as usize;
        raw.min(self.num_buckets - 1)
    }
}

/// Accumulated counts and indices for a set of recordings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationState {
    num_buckets: usize,
    max_distance: f64,
    resolution: f64,
    num_files: usize,
    higher_counts: Vec<usize>,
    dropoff_counts: Vec<usize>,
    higher_entries: Vec<Vec<BinEntry>>,
    dropoff_entries: Vec<Vec<BinEntry>>,
    both_count: usize,
    both_entries: Vec<BinEntry>,
    free_file_names: Vec<String>,
    durations: Vec<DurationEntry>,
    too_short_count: usize,
    anomaly_count: usize,
}

impl AggregationState {
    fn empty(config: BinConfig, num_files: usize) -> Self {
        let n = config.num_buckets;
        Self {
            num_buckets: n,
            max_distance: config.max_distance,
            resolution: config.resolution,
            num_files,
            higher_counts: vec![0; n],
            dropoff_counts: vec![0; n],
            higher_entries: vec![Vec::new(); n],
            dropoff_entries: vec![Vec::new(); n],
            ..Self::default()
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of recordings considered; denominator for the free-file ratio.
    pub fn num_files(&self) -> usize {
        self.num_files
    }

    pub fn higher_counts(&self) -> &[usize] {
        &self.higher_counts
    }

    pub fn dropoff_counts(&self) -> &[usize] {
        &self.dropoff_counts
    }

    pub fn higher_entries(&self) -> &[Vec<BinEntry>] {
        &self.higher_entries
    }

    pub fn dropoff_entries(&self) -> &[Vec<BinEntry>] {
        &self.dropoff_entries
    }

    pub fn both_count(&self) -> usize {
        self.both_count
    }

    pub fn both_entries(&self) -> &[BinEntry] {
        &self.both_entries
    }

    pub fn free_file_names(&self) -> &[String] {
        &self.free_file_names
    }

    /// Known durations in ingestion order. May repeat a name.
    pub fn durations(&self) -> &[DurationEntry] {
        &self.durations
    }

    /// Observations dropped by the duration filter.
    pub fn too_short_count(&self) -> usize {
        self.too_short_count
    }

    /// Observations with neither type flag.
    pub fn anomaly_count(&self) -> usize {
        self.anomaly_count
    }

    pub fn total_higher(&self) -> usize {
        self.higher_counts.iter().sum()
    }

    pub fn total_dropoff(&self) -> usize {
        self.dropoff_counts.iter().sum()
    }

    /// All qualifying observations: higher + dropoff + both.
    pub fn total_obstacles(&self) -> usize {
        self.total_higher() + self.total_dropoff() + self.both_count
    }

    /// Counters agree with the entry lists.
    pub fn is_reconciled(&self) -> bool {
        let higher_entries: usize = self.higher_entries.iter().map(Vec::len).sum();
        let dropoff_entries: usize = self.dropoff_entries.iter().map(Vec::len).sum();
        self.total_higher() == higher_entries
            && self.total_dropoff() == dropoff_entries
            && self.both_count == self.both_entries.len()
    }
}

/// Folds recordings into an [`AggregationState`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    config: BinConfig,
    state: AggregationState,
}

impl Aggregator {
    /// Create an empty aggregator for the given bucket layout.
    pub fn configure(
        max_distance: f64,
        resolution: f64,
        expected_files: usize,
    ) -> EvalResult<Self> {
        let config = BinConfig::new(max_distance, resolution)?;
        Ok(Self::from_config(config, expected_files))
    }

    pub fn from_config(config: BinConfig, expected_files: usize) -> Self {
        Self {
            config,
            state: AggregationState::empty(config, expected_files),
        }
    }

    pub fn config(&self) -> BinConfig {
        self.config
    }

    /// Current state, read-only.
    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    /// Fold one recording into the state.
    pub fn ingest(&mut self, recording: &RecordingFile) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();

        if recording.is_obstacle_free() {
            self.state.free_file_names.push(recording.name.clone());
            outcome.obstacle_free = true;
        }

        for obstacle in &recording.obstacles {
            if !obstacle.is_long_enough() {
                debug!(
                    "{}: dropping observation at frame {} spanning {} frame(s)",
                    recording.name,
                    obstacle.start_frame,
                    obstacle.frame_span()
                );
                self.state.too_short_count += 1;
                outcome.too_short += 1;
                continue;
            }

            let bucket = self.config.bucket_index(obstacle.distance);
            let entry = BinEntry::new(recording.name.as_str(), obstacle.start_frame);

            match obstacle.category() {
                Category::HigherOnly => {
                    self.state.higher_counts[bucket] += 1;
                    self.state.higher_entries[bucket].push(entry);
                }
                Category::DropoffOnly => {
                    self.state.dropoff_counts[bucket] += 1;
                    self.state.dropoff_entries[bucket].push(entry);
                }
                Category::Both => {
                    self.state.both_count += 1;
                    self.state.both_entries.push(entry);
                }
                Category::Neither => {
                    let anomaly = AnomalousObservation {
                        file_name: recording.name.clone(),
                        start_frame: obstacle.start_frame,
                        distance: obstacle.distance,
                    };
                    warn!("Anomalous observation: {}", anomaly);
                    self.state.anomaly_count += 1;
                    outcome.anomalies.push(anomaly);
                    continue;
                }
            }
            outcome.counted += 1;
        }

        if let Some(seconds) = recording.duration_seconds {
            self.state.durations.push(DurationEntry {
                file_name: recording.name.clone(),
                seconds,
            });
        }

        outcome
    }

    /// Merge a partial state produced by another aggregator with the same
    /// bucket layout.
    ///
    /// Counts are added, entry lists concatenated, and the free-file and
    /// duration lists concatenated then de-duplicated by name with the first
    /// occurrence kept. Renderers de-duplicate those lists the same way, so
    /// reports do not depend on how ingestion was split.
    pub fn merge(&mut self, partial: AggregationState) -> EvalResult<()> {
        if partial.num_buckets != self.state.num_buckets
            || partial.max_distance != self.state.max_distance
        {
            return Err(EvalError::IncompatibleMerge(format!(
                "{} buckets up to {} m vs {} buckets up to {} m",
                self.state.num_buckets,
                self.state.max_distance,
                partial.num_buckets,
                partial.max_distance
            )));
        }

        let state = &mut self.state;
        for (i, count) in partial.higher_counts.iter().enumerate() {
            state.higher_counts[i] += count;
        }
        for (i, count) in partial.dropoff_counts.iter().enumerate() {
            state.dropoff_counts[i] += count;
        }
        for (bucket, entries) in state.higher_entries.iter_mut().zip(partial.higher_entries) {
            bucket.extend(entries);
        }
        for (bucket, entries) in state.dropoff_entries.iter_mut().zip(partial.dropoff_entries) {
            bucket.extend(entries);
        }

        state.both_count += partial.both_count;
        state.both_entries.extend(partial.both_entries);

        state.free_file_names.extend(partial.free_file_names);
        let mut seen = HashSet::new();
        state.free_file_names.retain(|name| seen.insert(name.clone()));

        state.durations.extend(partial.durations);
        let mut seen = HashSet::new();
        state
            .durations
            .retain(|entry| seen.insert(entry.file_name.clone()));

        state.too_short_count += partial.too_short_count;
        state.anomaly_count += partial.anomaly_count;
        state.num_files = state.num_files.max(partial.num_files);

        Ok(())
    }

    /// Finalize ingestion and return the read-only snapshot.
    pub fn finish(self) -> AggregationState {
        debug_assert!(self.state.is_reconciled());
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObservedObstacle;

    fn obstacle(distance: f64, higher: bool, dropoff: bool, start: i64, end: i64) -> ObservedObstacle {
        ObservedObstacle {
            distance,
            is_higher_obstacle: higher,
            is_dropoff: dropoff,
            start_frame: start,
            end_frame: end,
        }
    }

    fn default_aggregator(files: usize) -> Aggregator {
        Aggregator::configure(4.0, 0.5, files).unwrap()
    }

    fn sample_recordings() -> Vec<RecordingFile> {
        vec![
            RecordingFile::new(
                "a",
                vec![
                    obstacle(0.3, true, false, 0, 10),
                    obstacle(1.2, false, true, 20, 30),
                    obstacle(1.4, false, true, 40, 41),
                ],
            )
            .with_duration(60.0),
            RecordingFile::new(
                "b",
                vec![
                    obstacle(0.1, true, true, 0, 5),
                    obstacle(3.6, true, false, 7, 12),
                    obstacle(9.0, false, true, 100, 200),
                ],
            ),
            RecordingFile::new("c", Vec::new()).with_duration(120.0),
            RecordingFile::new(
                "d",
                vec![obstacle(1.2, false, true, 3, 9), obstacle(2.0, false, false, 0, 9)],
            ),
        ]
    }

    fn sorted(entries: &[BinEntry]) -> Vec<BinEntry> {
        let mut entries = entries.to_vec();
        entries.sort();
        entries
    }

    #[test]
    fn test_configure_bucket_count() {
        let agg = default_aggregator(0);
        assert_eq!(agg.config().num_buckets, 8);
        assert_eq!(agg.state().higher_counts().len(), 8);
        assert_eq!(agg.state().dropoff_entries().len(), 8);
    }

    #[test]
    fn test_configure_rejects_zero_buckets() {
        assert!(matches!(
            Aggregator::configure(0.4, 0.5, 1),
            Err(EvalError::Configuration(_))
        ));
        assert!(Aggregator::configure(0.0, 0.5, 1).is_err());
        assert!(Aggregator::configure(4.0, -0.5, 1).is_err());
        assert!(Aggregator::configure(f64::NAN, 0.5, 1).is_err());
        assert!(Aggregator::configure(4.0, 1e-9, 1).is_err());
    }

    #[test]
    fn test_bucket_index_in_range_and_clamped() {
        let config = BinConfig::new(4.0, 0.5).unwrap();
        assert_eq!(config.bucket_index(0.0), 0);
        assert_eq!(config.bucket_index(0.49), 0);
        assert_eq!(config.bucket_index(0.5), 1);
        assert_eq!(config.bucket_index(3.9), 7);
        assert_eq!(config.bucket_index(4.0), 7);
        assert_eq!(config.bucket_index(10.0), 7);
        assert_eq!(config.bucket_index(-1.0), 0);
        assert_eq!(config.bucket_index(f64::NAN), 0);

        for step in 0..200 {
            let distance = step as f64 * 0.037;
            assert!(config.bucket_index(distance) < config.num_buckets);
        }
    }

    #[test]
    fn test_single_recording_scenario() {
        let mut agg = default_aggregator(1);
        let outcome = agg.ingest(&RecordingFile::new(
            "A",
            vec![
                obstacle(0.3, true, false, 0, 10),
                obstacle(3.9, false, true, 5, 9),
            ],
        ));
        let state = agg.finish();

        assert_eq!(outcome.counted, 2);
        assert_eq!(state.higher_counts()[0], 1);
        assert_eq!(state.dropoff_counts()[7], 1);
        assert_eq!(state.total_higher(), 1);
        assert_eq!(state.total_dropoff(), 1);
        assert_eq!(state.both_count(), 0);
        assert!(state.free_file_names().is_empty());
        assert_eq!(state.higher_entries()[0], vec![BinEntry::new("A", 0)]);
        assert_eq!(state.dropoff_entries()[7], vec![BinEntry::new("A", 5)]);
    }

    #[test]
    fn test_short_observation_excluded_everywhere() {
        for (higher, dropoff) in [(true, false), (false, true), (true, true), (false, false)] {
            let mut agg = default_aggregator(1);
            let outcome = agg.ingest(&RecordingFile::new(
                "short",
                vec![obstacle(1.0, higher, dropoff, 0, 2)],
            ));
            let state = agg.finish();

            assert_eq!(outcome.too_short, 1);
            assert_eq!(outcome.counted, 0);
            assert!(outcome.anomalies.is_empty());
            assert_eq!(state.total_obstacles(), 0);
            assert!(state.higher_entries().iter().all(Vec::is_empty));
            assert!(state.dropoff_entries().iter().all(Vec::is_empty));
            assert!(state.both_entries().is_empty());
            assert!(state.free_file_names().is_empty());
        }
    }

    #[test]
    fn test_obstacle_free_recording_with_duration() {
        let mut agg = default_aggregator(1);
        let outcome = agg.ingest(&RecordingFile::new("quiet", Vec::new()).with_duration(120.0));
        let state = agg.finish();

        assert!(outcome.obstacle_free);
        assert_eq!(state.free_file_names(), ["quiet".to_string()]);
        assert_eq!(state.durations().len(), 1);
        assert_eq!(state.durations()[0].seconds, 120.0);
        assert_eq!(state.total_obstacles(), 0);
    }

    #[test]
    fn test_both_type_only_touches_both_count() {
        let mut agg = default_aggregator(1);
        agg.ingest(&RecordingFile::new(
            "both",
            vec![obstacle(1.1, true, true, 4, 20)],
        ));
        let state = agg.finish();

        assert_eq!(state.both_count(), 1);
        assert_eq!(state.both_entries(), [BinEntry::new("both", 4)]);
        assert_eq!(state.total_higher(), 0);
        assert_eq!(state.total_dropoff(), 0);
    }

    #[test]
    fn test_extreme_frame_numbers_do_not_overflow() {
        let mut agg = default_aggregator(1);
        let outcome = agg.ingest(&RecordingFile::new(
            "edge",
            vec![
                obstacle(0.3, true, false, i64::MIN, 10),
                obstacle(0.3, true, false, i64::MAX, i64::MIN),
            ],
        ));

        assert_eq!(outcome.counted, 1);
        assert_eq!(outcome.too_short, 1);
        assert_eq!(agg.finish().higher_counts()[0], 1);
    }

    #[test]
    fn test_far_obstacle_lands_in_last_bucket() {
        let mut agg = default_aggregator(1);
        agg.ingest(&RecordingFile::new(
            "far",
            vec![obstacle(10.0, true, false, 0, 10)],
        ));
        let state = agg.finish();

        assert_eq!(state.higher_counts()[7], 1);
        assert_eq!(state.total_higher(), 1);
    }

    #[test]
    fn test_neither_is_reported_not_counted() {
        let mut agg = default_aggregator(1);
        let outcome = agg.ingest(&RecordingFile::new(
            "odd",
            vec![obstacle(1.0, false, false, 0, 10), obstacle(1.0, true, false, 0, 10)],
        ));
        let state = agg.finish();

        assert_eq!(outcome.anomalies.len(), 1);
        assert_eq!(outcome.anomalies[0].file_name, "odd");
        assert_eq!(outcome.counted, 1);
        assert_eq!(state.anomaly_count(), 1);
        assert_eq!(state.total_obstacles(), 1);
    }

    #[test]
    fn test_totals_match_duration_filter() {
        let recordings = sample_recordings();
        let mut agg = default_aggregator(recordings.len());
        for recording in &recordings {
            agg.ingest(recording);
        }
        let state = agg.finish();

        let expected = recordings
            .iter()
            .flat_map(|r| &r.obstacles)
            .filter(|o| o.is_long_enough() && o.category() != Category::Neither)
            .count();
        assert_eq!(state.total_obstacles(), expected);
        assert!(state.is_reconciled());
        assert_eq!(state.too_short_count(), 1);
        assert_eq!(state.anomaly_count(), 1);
    }

    #[test]
    fn test_duplicate_file_entries_are_kept() {
        let mut agg = default_aggregator(1);
        agg.ingest(&RecordingFile::new(
            "dup",
            vec![obstacle(0.1, true, false, 0, 10), obstacle(0.2, true, false, 30, 40)],
        ));
        let state = agg.finish();

        assert_eq!(state.higher_counts()[0], 2);
        assert_eq!(
            state.higher_entries()[0],
            vec![BinEntry::new("dup", 0), BinEntry::new("dup", 30)]
        );
    }

    #[test]
    fn test_order_independence() {
        let recordings = sample_recordings();
        let mut forward = default_aggregator(recordings.len());
        for recording in &recordings {
            forward.ingest(recording);
        }
        let mut backward = default_aggregator(recordings.len());
        for recording in recordings.iter().rev() {
            backward.ingest(recording);
        }
        let (forward, backward) = (forward.finish(), backward.finish());

        assert_eq!(forward.higher_counts(), backward.higher_counts());
        assert_eq!(forward.dropoff_counts(), backward.dropoff_counts());
        assert_eq!(forward.both_count(), backward.both_count());
        for bucket in 0..forward.num_buckets() {
            assert_eq!(
                sorted(&forward.higher_entries()[bucket]),
                sorted(&backward.higher_entries()[bucket])
            );
            assert_eq!(
                sorted(&forward.dropoff_entries()[bucket]),
                sorted(&backward.dropoff_entries()[bucket])
            );
        }
    }

    #[test]
    fn test_merge_matches_sequential_ingestion() {
        let recordings = sample_recordings();

        let mut sequential = default_aggregator(recordings.len());
        for recording in &recordings {
            sequential.ingest(recording);
        }

        let mut merged = default_aggregator(recordings.len());
        for chunk in recordings.chunks(2) {
            let mut partial = default_aggregator(recordings.len());
            for recording in chunk {
                partial.ingest(recording);
            }
            merged.merge(partial.finish()).unwrap();
        }

        assert_eq!(merged.finish(), sequential.finish());
    }

    #[test]
    fn test_merge_dedups_free_files_and_durations() {
        let mut first = default_aggregator(3);
        first.ingest(&RecordingFile::new("x", Vec::new()).with_duration(30.0));

        let mut second = default_aggregator(3);
        second.ingest(&RecordingFile::new("x", Vec::new()).with_duration(90.0));
        second.ingest(&RecordingFile::new("y", Vec::new()));

        first.merge(second.finish()).unwrap();
        let state = first.finish();

        assert_eq!(state.free_file_names(), ["x".to_string(), "y".to_string()]);
        assert_eq!(state.durations().len(), 1);
        assert_eq!(state.durations()[0].seconds, 30.0);
    }

    #[test]
    fn test_merge_rejects_other_layout() {
        let mut agg = default_aggregator(1);
        let other = Aggregator::configure(5.0, 0.5, 1).unwrap().finish();
        assert!(matches!(
            agg.merge(other),
            Err(EvalError::IncompatibleMerge(_))
        ));
    }
}
