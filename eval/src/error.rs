// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for annotation evaluation
//!
//! Every variant here is fatal for a run. Degenerate numeric cases (empty
//! sequences, zero unions, zero denominators) are absorbed by the metric
//! functions and never surface as an error.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Error type for evaluation operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EvalError {
    /// A line of an input source is not a valid annotation record.
    #[error("{source_name}:{line}: invalid record: {message}")]
    InputFormat {
        source_name: String,
        line: usize,
        message: String,
    },

    /// An input or output file could not be accessed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Gold and predicted record sets share no document id.
    #[error("no overlapping doc_id between gold ({gold} docs) and predictions ({pred} docs)")]
    EmptyIntersection { gold: usize, pred: usize },

    /// A joined document lacks a field every scored document must carry.
    #[error("document {doc_id:?} is missing required field {field}")]
    MissingField { doc_id: String, field: &'static str },

    /// Parallel label sequences differ in length.
    #[error("label sequences differ in length ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },

    /// Configuration value outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Result could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Confusion-matrix CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EvalError {
    /// Create an input format error for a given source and 1-based line.
    pub fn input_format(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        EvalError::InputFormat {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    /// Create an I/O error tagged with the path involved.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_format_message_names_line() {
        let err = EvalError::input_format("gold.jsonl", 7, "expected value");
        assert_eq!(err.to_string(), "gold.jsonl:7: invalid record: expected value");
    }

    #[test]
    fn test_missing_field_message() {
        let err = EvalError::MissingField {
            doc_id: "d1".to_string(),
            field: "stage2.label",
        };
        assert!(err.to_string().contains("\"d1\""));
        assert!(err.to_string().contains("stage2.label"));
    }
}
