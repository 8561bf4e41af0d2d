//! Git-backed [`Fetcher`].

use crate::locator::SourceLocation;
use crate::traits::{FetchError, Fetcher};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fetches sources with a shallow `git clone`.
///
/// Hooks are disabled and only the requested ref is cloned. The child
/// process is killed when the crawl is cancelled.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: OsString,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self {
            program: OsString::from("git"),
        }
    }

    /// Uses a specific git executable instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn clone_args(location: &SourceLocation, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-c",
            "core.hooksPath=/dev/null",
            "-c",
            "advice.detachedHead=false",
            "clone",
            "--depth",
            "1",
            "--single-branch",
            "--no-tags",
            "--quiet",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if let Some(git_ref) = location.git_ref() {
            args.push("--branch".into());
            args.push(git_ref.into());
        }
        args.push("--".into());
        args.push(location.repository().as_str().into());
        args.push(dest.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    fn name(&self) -> &str {
        "git"
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        location: &SourceLocation,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let url = location.repository().as_str().to_string();
        if !matches!(location.repository().scheme(), "https" | "http" | "ssh" | "file") {
            return Err(FetchError::Unsupported(location.to_string()));
        }

        debug!(url = %url, dest = %dest.display(), "Cloning repository");
        let child = Command::new(&self.program)
            .args(Self::clone_args(location, dest))
            .env("GIT_TEMPLATE_DIR", "")
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Failed {
                url: url.clone(),
                message: format!("failed to run git: {e}"),
            })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled(url)),
            output = child.wait_with_output() => output?,
        };

        if !output.status.success() {
            return Err(FetchError::Failed {
                url,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
