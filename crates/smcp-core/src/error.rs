//! Error types for smcp.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level result type for smcp operations.
pub type Result<T> = std::result::Result<T, SmcpError>;

/// Top-level error type for smcp.
#[derive(Debug, Error)]
pub enum SmcpError {
    /// The embedding model is unavailable or rejected the input.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A persisted index or catalog file could not be read back.
    #[error("index corruption in {path}: {reason}")]
    IndexCorruption { path: PathBuf, reason: String },

    #[error("vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SmcpError {
    /// Shorthand for [`SmcpError::IndexCorruption`].
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SmcpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by vector index mutations and queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("ids and vectors differ in length: {ids} ids, {vectors} vectors")]
    LengthMismatch { ids: usize, vectors: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_human_readable_messages() {
        let err = SmcpError::corruption("data/vectors.index", "bad magic");
        let msg = err.to_string();
        assert!(msg.contains("data/vectors.index"));
        assert!(msg.contains("bad magic"));

        let err: SmcpError = VectorError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn json_errors_become_serialization_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(SmcpError::from(err), SmcpError::Serialization(_)));
    }
}
