//! Record source for recording documents.
//!
//! Discovers JSON documents below a directory and parses each one into a
//! [`RecordingFile`]. Malformed documents are rejected here, before they
//! reach the aggregator.

use crate::error::{EvalError, EvalResult};
use crate::models::{ObservedObstacle, RecordingFile};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Configuration for document discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include, compared case-insensitively.
    pub extensions: Vec<String>,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["json".to_string()],
            follow_links: true,
        }
    }
}

/// A discovered recording document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Walks a data directory for recording documents.
pub struct RecordScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl RecordScanner {
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// All matching documents, sorted by path.
    pub fn scan(&self) -> EvalResult<Vec<ScannedFile>> {
        if !self.root.is_dir() {
            return Err(EvalError::configuration(format!(
                "data directory does not exist: {}",
                self.root.display()
            )));
        }

        let mut files: Vec<ScannedFile> = WalkDir::new(&self.root)
            .follow_links(self.config.follow_links)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && self.matches(e.path()))
            .map(|e| ScannedFile {
                size: e.metadata().map(|m| m.len()).unwrap_or(0),
                path: e.into_path(),
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Check if a path has one of the configured extensions.
    pub fn matches(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.config
            .extensions
            .iter()
            .any(|wanted| wanted.eq_ignore_ascii_case(ext))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Keys every obstacle object must carry.
const OBSTACLE_FIELDS: [&str; 5] = [
    "distance",
    "is_higher_obstacle",
    "is_dropoff",
    "start_frame",
    "end_frame",
];

fn parse_obstacle(source_name: &str, index: usize, raw: &Value) -> EvalResult<ObservedObstacle> {
    let fields = raw.as_object().ok_or_else(|| {
        EvalError::malformed(source_name, format!("obstacles[{}] is not a JSON object", index))
    })?;

    if let Some(missing) = OBSTACLE_FIELDS.iter().find(|key| !fields.contains_key(**key)) {
        return Err(EvalError::missing_field(
            source_name,
            format!("obstacles[{}].{}", index, missing),
        ));
    }

    serde_json::from_value(raw.clone())
        .map_err(|e| EvalError::malformed(source_name, format!("obstacles[{}]: {}", index, e)))
}

/// Parse one recording document.
///
/// `source_name` identifies the document in errors; `fallback_name` is used
/// when the document carries no `name`.
pub fn parse_recording(
    source_name: &str,
    fallback_name: &str,
    content: &str,
) -> EvalResult<RecordingFile> {
    let document: Value = serde_json::from_str(content)
        .map_err(|e| EvalError::malformed(source_name, e.to_string()))?;

    let object = document
        .as_object()
        .ok_or_else(|| EvalError::malformed(source_name, "document is not a JSON object"))?;

    let raw_obstacles = object
        .get("obstacles")
        .ok_or_else(|| EvalError::missing_field(source_name, "obstacles"))?
        .as_array()
        .ok_or_else(|| EvalError::malformed(source_name, "`obstacles` is not a list"))?;

    let obstacles = raw_obstacles
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_obstacle(source_name, i, raw))
        .collect::<EvalResult<Vec<_>>>()?;

    let name = match object.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Null) | None => fallback_name.to_string(),
        Some(_) => return Err(EvalError::malformed(source_name, "`name` is not a string")),
    };

    let duration_seconds = object
        .get("duration_seconds")
        .or_else(|| object.get("duration"))
        .and_then(Value::as_f64)
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0);

    Ok(RecordingFile {
        name,
        obstacles,
        duration_seconds,
    })
}

/// Read and parse a recording document from disk.
pub fn load_recording(path: &Path) -> EvalResult<RecordingFile> {
    let source_name = path.display().to_string();
    let content = fs::read_to_string(path)
        .map_err(|e| EvalError::malformed(&source_name, format!("cannot read file: {}", e)))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| source_name.clone());

    parse_recording(&source_name, &stem, &content)
}
