//! Git-backed snapshots.
//!
//! Reads files straight out of commit trees with git2, so the two revisions
//! never have to be checked out. Remote repositories are cloned (bare) into
//! a temporary directory first.

use super::SnapshotSource;
use crate::error::TrackerError;
use git2::{ErrorCode, FetchOptions, Progress, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// Snapshot source reading blobs from a git repository.
pub struct GitSnapshotSource {
    repo: Repository,
    path: PathBuf,
    /// Keeps a temporary clone alive for as long as the source exists.
    _temp_dir: Option<TempDir>,
}

/// Returns true when `location` should be cloned rather than opened.
pub fn is_remote_url(location: &str) -> bool {
    location.starts_with("https://") || location.starts_with("http://") || location.starts_with("git@")
}

impl GitSnapshotSource {
    /// Open a local repository or clone a remote one, depending on `location`.
    pub fn from_location(location: &str, show_progress: bool) -> Result<Self, TrackerError> {
        if is_remote_url(location) {
            Self::clone_remote(location, show_progress)
        } else {
            Self::open(Path::new(location))
        }
    }

    /// Open an existing local repository (any directory inside it works).
    pub fn open(path: &Path) -> Result<Self, TrackerError> {
        info!("Opening local repository: {}", path.display());

        let repo = Repository::discover(path)?;
        let path = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();

        Ok(Self {
            repo,
            path,
            _temp_dir: None,
        })
    }

    /// Clone a repository into a temporary directory.
    ///
    /// The clone is bare and carries full history, since both snapshot
    /// revisions must be reachable. The directory lives as long as the source.
    pub fn clone_remote(url: &str, show_progress: bool) -> Result<Self, TrackerError> {
        info!("Cloning repository: {}", url);

        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        debug!("Clone target: {}", path.display());

        let progress_bar = if show_progress {
            let pb = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            pb.set_style(style);
            Some(Arc::new(pb))
        } else {
            None
        };

        let pb_clone = progress_bar.clone();
        let mut callbacks = RemoteCallbacks::new();

        callbacks.transfer_progress(move |progress: Progress<'_>| {
            if let Some(ref pb) = pb_clone {
                pb.set_length(progress.total_objects() as u64);
                pb.set_position(progress.received_objects() as u64);
            }
            true
        });

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks);

        let mut builder = git2::build::RepoBuilder::new();
        builder.bare(true);
        builder.fetch_options(fetch_opts);

        let repo = builder.clone(url, &path)?;

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Clone complete");
        }

        info!("Successfully cloned repository to: {}", path.display());

        Ok(Self {
            repo,
            path,
            _temp_dir: Some(temp_dir),
        })
    }

    /// Root of the repository (work tree, or git dir for bare clones).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short id of the commit a revision resolves to.
    pub fn short_id(&self, revision: &str) -> Result<String, TrackerError> {
        let commit = self.resolve(revision)?;
        let id = commit.id().to_string();
        Ok(id[..id.len().min(10)].to_string())
    }

    fn resolve(&self, revision: &str) -> Result<git2::Commit<'_>, TrackerError> {
        self.repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map_err(|source| TrackerError::Revision {
                revision: revision.to_string(),
                source,
            })
    }
}

impl SnapshotSource for GitSnapshotSource {
    fn fetch(&self, revision: &str, locator: &str) -> Result<Option<String>, TrackerError> {
        let commit = self.resolve(revision)?;
        let tree = commit.tree()?;

        let entry = match tree.get_path(Path::new(locator)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!("{} not present at {}", locator, revision);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let blob = match entry.to_object(&self.repo)?.into_blob() {
            Ok(blob) => blob,
            Err(_) => {
                debug!("{} at {} is not a file", locator, revision);
                return Ok(None);
            }
        };

        let content = std::str::from_utf8(blob.content())
            .map_err(|e| TrackerError::malformed(revision, locator, e))?;

        Ok(Some(content.to_string()))
    }
}
