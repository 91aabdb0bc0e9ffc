// error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::markers::MarkerKey;

/// Fatal conditions raised anywhere in the assignment pipeline.
///
/// Target markers without a reference counterpart are not errors; they are
/// counted in [`crate::markers::MatchSummary`].
#[derive(Error, Debug)]
pub enum ImpRefError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Encoding error at marker {key}, sample index {sample} (token '{token}'): {reason}")]
    Encoding {
        key: MarkerKey,
        sample: usize,
        token: String,
        reason: String,
    },

    #[error("Consistent marker {key} has no encoded data in the {source_name}.")]
    MissingMarker { key: MarkerKey, source_name: &'static str },

    #[error("Dimension mismatch during {stage}: expected {expected}, found {found}.")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "Column {column} of the reference and target matrices holds different markers: {reference} vs {target}."
    )]
    MarkerOrderMismatch {
        column: usize,
        reference: MarkerKey,
        target: MarkerKey,
    },

    #[error("Class {label} has {count} sample(s) during {stage}; at least 2 are required.")]
    InsufficientClassSamples {
        label: usize,
        count: usize,
        stage: &'static str,
    },

    #[error("Class label {label} has no population name (taxonomy holds {taxonomy_size} entries).")]
    UnknownPopulation { label: usize, taxonomy_size: usize },

    #[error("No {what} available; cannot continue.")]
    EmptyInput { what: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("The {0} has not been fitted.")]
    NotFitted(&'static str),

    #[error("Optimization failed: {0}")]
    Optimization(String),

    #[error("Model file error: {0}")]
    ModelFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ImpRefError>;

impl ImpRefError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn dimension(stage: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            stage,
            expected,
            found,
        }
    }
}
