//! Version-control access.
//!
//! The crawler reads version-control state in two places: the fetched
//! workspace (for permalinks) and the hub checkout (for change detection).
//! Both go through [`VersionControl`] so tests can substitute an in-memory
//! implementation.

pub mod git;

pub use git::GitCli;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),
    #[error("remote '{0}' not found")]
    RemoteNotFound(String),
    #[error("git {command} failed in {dir}: {message}")]
    Command {
        command: String,
        dir: PathBuf,
        message: String,
    },
    #[error("unexpected git output: {0}")]
    Output(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status of one side (index or worktree) of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Unmodified,
    Untracked,
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    UpdatedButUnmerged,
    TypeChanged,
    Ignored,
}

/// Status of one path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub staging: StatusCode,
    pub worktree: StatusCode,
}

/// An opened repository.
pub trait Repository {
    /// Configured URLs of the named remote, in configuration order.
    fn remote_urls(&self, name: &str) -> Result<Vec<String>, VcsError>;

    /// Commit hash `HEAD` points to.
    fn head_revision(&self) -> Result<String, VcsError>;

    /// Every path whose status differs from the committed tree.
    fn worktree_status(&self) -> Result<Vec<FileStatus>, VcsError>;
}

/// Opens repositories.
pub trait VersionControl: Send + Sync {
    /// Opens the repository whose root is exactly `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn Repository>, VcsError>;
}
