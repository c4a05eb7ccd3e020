//! Data models for obstacle evaluation.
//!
//! This module contains the per-recording input records, the obstacle
//! classification, and the small value types stored by the aggregator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum number of frames (`end_frame - start_frame`) an observation must
/// span to count as a real detection.
pub const MIN_OBSERVATION_FRAMES: i64 = 3;

/// A single obstacle observation inside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedObstacle {
    /// Distance in meters at which the obstacle was first seen.
    pub distance: f64,
    /// Obstacle rises above the ground plane.
    pub is_higher_obstacle: bool,
    /// Obstacle is a drop in the ground plane.
    pub is_dropoff: bool,
    /// First frame the obstacle was observed in.
    pub start_frame: i64,
    /// Last frame the obstacle was observed in.
    pub end_frame: i64,
}

impl ObservedObstacle {
    /// Number of frames spanned by the observation, saturating at the `i64`
    /// bounds.
    pub fn frame_span(&self) -> i64 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    /// Whether the observation survives the duration filter.
    pub fn is_long_enough(&self) -> bool {
        self.frame_span() >= MIN_OBSERVATION_FRAMES
    }

    /// Classify the obstacle from its type flags.
    pub fn category(&self) -> Category {
        Category::from_flags(self.is_higher_obstacle, self.is_dropoff)
    }
}

/// A recorded drive/session with its obstacle observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingFile {
    /// Unique recording name.
    pub name: String,
    /// Observations in the order the detector reported them.
    pub obstacles: Vec<ObservedObstacle>,
    /// Recording length, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl RecordingFile {
    #[allow(dead_code)] // Constructor for in-memory record sources
    pub fn new(name: impl Into<String>, obstacles: Vec<ObservedObstacle>) -> Self {
        Self {
            name: name.into(),
            obstacles,
            duration_seconds: None,
        }
    }

    #[allow(dead_code)] // Builder for in-memory record sources
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// A recording without any observations.
    pub fn is_obstacle_free(&self) -> bool {
        self.obstacles.is_empty()
    }
}

/// Mutually exclusive obstacle category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Raised obstacle only.
    HigherOnly,
    /// Drop-off only.
    DropoffOnly,
    /// Flagged as both raised obstacle and drop-off.
    Both,
    /// Neither flag set; anomalous.
    Neither,
}

impl Category {
    pub fn from_flags(is_higher: bool, is_dropoff: bool) -> Self {
        match (is_higher, is_dropoff) {
            (true, false) => Category::HigherOnly,
            (false, true) => Category::DropoffOnly,
            (true, true) => Category::Both,
            (false, false) => Category::Neither,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::HigherOnly => write!(f, "Higher"),
            Category::DropoffOnly => write!(f, "Dropoff"),
            Category::Both => write!(f, "Both (Higher & Dropoff)"),
            Category::Neither => write!(f, "Unclassified"),
        }
    }
}

/// One qualifying observation stored in a bucket: which file, which frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BinEntry {
    pub file_name: String,
    pub start_frame: i64,
}

impl BinEntry {
    pub fn new(file_name: impl Into<String>, start_frame: i64) -> Self {
        Self {
            file_name: file_name.into(),
            start_frame,
        }
    }
}

/// Known duration of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationEntry {
    pub file_name: String,
    pub seconds: f64,
}

/// An observation that carried neither type flag.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalousObservation {
    pub file_name: String,
    pub start_frame: i64,
    pub distance: f64,
}

impl fmt::Display for AnomalousObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ frame {} ({:.2} m): neither higher obstacle nor dropoff",
            self.file_name, self.start_frame, self.distance
        )
    }
}

/// What a single `ingest` call did with a recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    /// Observations routed into a bucket or the both-type list.
    pub counted: usize,
    /// Observations dropped by the duration filter.
    pub too_short: usize,
    /// Observations classified as neither type.
    pub anomalies: Vec<AnomalousObservation>,
    /// The recording had no observations at all.
    pub obstacle_free: bool,
}
