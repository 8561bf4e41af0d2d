use crate::vcs::{VcsError, VersionControl};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Remote whose URL the permalink is derived from.
pub const ORIGIN: &str = "origin";

/// Why no permalink could be built. Only ever logged.
#[derive(Error, Debug)]
enum Unavailable {
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error("remote 'origin' has no URL")]
    NoRemoteUrl,
    #[error("unparseable remote URL '{0}'")]
    BadUrl(String),
    #[error("remote host '{found}' is not '{expected}'")]
    ForeignHost { found: String, expected: String },
    #[error("remote URL '{0}' names no repository")]
    NoRepository(String),
}

/// Builds a commit-pinned base URL for files in the checkout at `repo_dir`.
///
/// The result looks like `https://github.com/owner/repo/blob/<commit>`. Any
/// failure (not a checkout, no origin, foreign host, no HEAD) yields `None`;
/// the reason is logged at debug level.
pub fn resolve(vcs: &dyn VersionControl, repo_dir: &Path, host: &str) -> Option<Url> {
    match try_resolve(vcs, repo_dir, host) {
        Ok(url) => Some(url),
        Err(reason) => {
            debug!(dir = %repo_dir.display(), %reason, "No permalink available");
            None
        }
    }
}

fn try_resolve(vcs: &dyn VersionControl, repo_dir: &Path, host: &str) -> Result<Url, Unavailable> {
    let repo = vcs.open(repo_dir)?;
    let remote = repo
        .remote_urls(ORIGIN)?
        .into_iter()
        .next()
        .ok_or(Unavailable::NoRemoteUrl)?;
    let repository = repository_path(&remote, host)?;
    let revision = repo.head_revision()?;

    Url::parse(&format!("https://{host}/{repository}/blob/{revision}"))
        .map_err(|_| Unavailable::BadUrl(remote))
}

/// Extracts `owner/repo` from a remote URL hosted on `host`.
///
/// Accepts URL forms (`https://`, `ssh://`) and the scp-like
/// `git@host:owner/repo.git` form.
fn repository_path(remote: &str, host: &str) -> Result<String, Unavailable> {
    let normalized = if remote.contains("://") {
        remote.to_string()
    } else {
        match remote.split_once(':') {
            Some((authority, path)) if !authority.contains('/') => {
                format!("ssh://{authority}/{}", path.trim_start_matches('/'))
            }
            _ => return Err(Unavailable::BadUrl(remote.to_string())),
        }
    };
    let url = Url::parse(&normalized).map_err(|_| Unavailable::BadUrl(remote.to_string()))?;

    let found = url.host_str().unwrap_or_default();
    if !found.eq_ignore_ascii_case(host) {
        return Err(Unavailable::ForeignHost {
            found: found.to_string(),
            expected: host.to_string(),
        });
    }

    let path = url.path().trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');
    if path.is_empty() {
        return Err(Unavailable::NoRepository(remote.to_string()));
    }
    Ok(path.to_string())
}
