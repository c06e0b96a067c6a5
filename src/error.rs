//! Error types shared by the snapshot, extraction and aggregation layers.

use thiserror::Error;

/// Errors raised while reading snapshots or building documents.
///
/// A parameter that is simply missing from a snapshot is not an error; the
/// source reports it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Malformed input in {revision}:{path}: {reason}")]
    MalformedInput {
        revision: String,
        path: String,
        reason: String,
    },

    #[error("Cannot resolve revision '{revision}': {source}")]
    Revision {
        revision: String,
        #[source]
        source: git2::Error,
    },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    pub fn malformed(revision: &str, path: &str, reason: impl ToString) -> Self {
        TrackerError::MalformedInput {
            revision: revision.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
