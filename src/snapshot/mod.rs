//! Snapshot retrieval.
//!
//! A snapshot is a fixed revision of the parameter repository. The
//! extractor only ever asks a source for the raw text of one file at one
//! revision, so any backend that can answer that question will do.

pub mod git;

pub use git::{is_remote_url, GitSnapshotSource};

use crate::error::TrackerError;

/// Something that returns raw file content for a revision/path pair.
pub trait SnapshotSource {
    /// Return the content of `locator` at `revision`.
    ///
    /// `Ok(None)` means the file does not exist in that snapshot. Errors are
    /// reserved for snapshots that cannot be read at all.
    fn fetch(&self, revision: &str, locator: &str) -> Result<Option<String>, TrackerError>;
}

/// In-memory source used by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySource {
    files: std::collections::HashMap<(String, String), String>,
}

#[cfg(test)]
impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, revision: &str, locator: &str, content: &str) -> Self {
        self.files.insert(
            (revision.to_string(), locator.to_string()),
            content.to_string(),
        );
        self
    }
}

#[cfg(test)]
impl SnapshotSource for MemorySource {
    fn fetch(&self, revision: &str, locator: &str) -> Result<Option<String>, TrackerError> {
        Ok(self
            .files
            .get(&(revision.to_string(), locator.to_string()))
            .cloned())
    }
}
