//! Error types for aggregation, record parsing and report output.

use std::path::PathBuf;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing field `{field}` in {source_name}")]
    MissingField { source_name: String, field: String },

    #[error("Malformed record {source_name}: {message}")]
    MalformedRecord {
        source_name: String,
        message: String,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot merge aggregation states: {0}")]
    IncompatibleMerge(String),
}

impl EvalError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn missing_field(source_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            source_name: source_name.into(),
            field: field.into(),
        }
    }

    pub fn malformed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DestinationWrite {
            path: path.into(),
            source,
        }
    }
}
