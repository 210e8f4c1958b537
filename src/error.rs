//! Error types for loading and analysing pressure-mat recordings.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid data in {} (line {line}): {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Cannot reshape {len} samples into {height}x{width} frames")]
    Shape {
        len: usize,
        height: usize,
        width: usize,
    },

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Aggregation error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        AnalysisError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(e: csv::Error) -> Self {
        AnalysisError::Metadata(e.to_string())
    }
}
