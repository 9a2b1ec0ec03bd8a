//! Error types for the conversion pass.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a conversion or formatting pass.
///
/// Decoding generated lines never produces one of these; see
/// [`crate::parser::ParseMiss`] for the non-fatal parse outcomes.
#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("failed to read or write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("dialogue {dialogue_idx} turn {turn_id} has no system transcript but targets were requested")]
    MissingResponse { dialogue_idx: String, turn_id: usize },

    #[error("dialogue {dialogue_idx} turn {turn_id} has no system annotation to draw multimodal objects from")]
    MissingSystemAnnotation { dialogue_idx: String, turn_id: usize },

    #[error("no retrieval candidates for dialogue {dialogue_idx} turn {turn_id}")]
    MissingRetrievalCandidates { dialogue_idx: String, turn_id: usize },

    #[error("no retrieval pool for domain '{0}'")]
    MissingRetrievalPool(String),

    #[error("candidate index {index} out of range for domain '{domain}' (pool size {pool_size})")]
    CandidateOutOfRange {
        domain: String,
        index: usize,
        pool_size: usize,
    },

    #[error("dialogue {dialogue_idx} turn {turn_id} lists {actual} retrieval candidates, expected {expected}")]
    CandidateCountMismatch {
        dialogue_idx: String,
        turn_id: usize,
        expected: usize,
        actual: usize,
    },

    #[error("#turns do not match: got {actual} scores, expected {expected}")]
    ScoreCountMismatch { expected: usize, actual: usize },

    #[error("line {line}: cannot parse retrieval score '{value}'")]
    InvalidScore { line: usize, value: String },

    #[error("line {line}: input contexts do not match")]
    ContextMismatch { line: usize },
}

pub type Result<T> = std::result::Result<T, FlattenError>;

impl FlattenError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
