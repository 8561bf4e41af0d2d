//! Per-package crawl pipeline.
//!
//! This module provides the [`Crawler`] coordinator that runs one package
//! through the crawl stages (Fetch → Reconcile → Scan → Publish) with:
//! - Async fetching via a pluggable [`Fetcher`], bounded by a timeout and a
//!   cancellation token
//! - Structured logging via `tracing`, carrying a [`CrawlContext`]
//! - Automatic cleanup of the scratch checkout via RAII (`Drop` on [`Workspace`])

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;
use walkdir::WalkDir;

use crate::config::CrawlerConfig;
use crate::crawl::changes::has_changes;
use crate::crawl::matcher::is_vex_file;
use crate::crawl::permalink;
use crate::crawl::reconcile::reset_dir;
use crate::crawl::validate::{validate, Verdict};
use crate::locator::SourceLocation;
use crate::model::{Manifest, ManifestError, Source, MANIFEST_FILE_NAME};
use crate::purl::{PackageUrl, PurlError};
use crate::traits::{FetchError, Fetcher};
use crate::vcs::{VcsError, VersionControl};
use crate::vex::DocumentError;

/// Directory that, when present at the walk root, holds all VEX content.
pub const VEX_DIR_NAME: &str = ".vex";

const WORKSPACE_PREFIX: &str = "vexhub-crawler-";

// ============================================================================
// Pipeline Types
// ============================================================================

/// Scratch directory holding one package's fetched source tree.
///
/// The directory is removed when the workspace is dropped, so every exit
/// path of a crawl (success, error, cancellation, panic) cleans up.
#[derive(Debug)]
pub struct Workspace {
    /// Root of the fetched checkout, inside the temporary directory
    pub checkout: PathBuf,

    _dir: TempDir,
}

impl Workspace {
    /// Creates a fresh temporary directory, under `parent` when given.
    ///
    /// The checkout path is named after the package and does not exist yet.
    pub fn create(parent: Option<&Path>, name: &str) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        let name = name.replace(['/', '\\'], "_");
        let name = match name.as_str() {
            "" | "." | ".." => "src".to_string(),
            _ => name,
        };
        Ok(Self {
            checkout: dir.path().join(name),
            _dir: dir,
        })
    }
}

/// Stage a crawl has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlStage {
    #[default]
    Init,
    Fetched,
    Reconciled,
    Scanning,
    Publishing,
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlStage::Init => "init",
            CrawlStage::Fetched => "fetched",
            CrawlStage::Reconciled => "reconciled",
            CrawlStage::Scanning => "scanning",
            CrawlStage::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Diagnostic context accumulated while a crawl progresses.
///
/// Attached to every [`CrawlError`] so a failure names the package, where it
/// came from, where it was going and which file was involved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlContext {
    pub purl: String,
    pub url: String,
    pub stage: CrawlStage,
    pub permalink: Option<String>,
    pub dir: Option<PathBuf>,
    pub file: Option<PathBuf>,
}

impl CrawlContext {
    pub fn new(purl: &PackageUrl, location: &SourceLocation) -> Self {
        Self {
            purl: purl.to_string(),
            url: location.to_string(),
            ..Default::default()
        }
    }

    fn with_file(&self, file: &Path) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            ..self.clone()
        }
    }

    fn error(&self, kind: CrawlErrorKind) -> CrawlError {
        CrawlError {
            context: self.clone(),
            kind,
        }
    }
}

impl fmt::Display for CrawlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "purl={} url={} stage={}", self.purl, self.url, self.stage)?;
        if let Some(permalink) = &self.permalink {
            write!(f, " permalink={permalink}")?;
        }
        if let Some(dir) = &self.dir {
            write!(f, " dir={}", dir.display())?;
        }
        if let Some(file) = &self.file {
            write!(f, " path={}", file.display())?;
        }
        Ok(())
    }
}

/// Successful end states of a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Documents match what the hub already has; the manifest was left alone
    Unchanged { dir: PathBuf, documents: usize },

    /// The package directory changed and a fresh manifest was written
    Updated { dir: PathBuf, manifest: Manifest },
}

impl CrawlOutcome {
    pub fn dir(&self) -> &Path {
        match self {
            CrawlOutcome::Unchanged { dir, .. } | CrawlOutcome::Updated { dir, .. } => dir,
        }
    }
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// A failed crawl, with the context it failed in.
#[derive(thiserror::Error, Debug)]
#[error("{kind} ({context})")]
pub struct CrawlError {
    pub context: CrawlContext,
    #[source]
    pub kind: CrawlErrorKind,
}

impl CrawlError {
    pub fn kind(&self) -> &CrawlErrorKind {
        &self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, CrawlErrorKind::Cancelled)
    }
}

/// Everything that aborts a crawl.
#[derive(thiserror::Error, Debug)]
pub enum CrawlErrorKind {
    /// Scratch directory could not be created
    #[error("failed to create a temporary directory: {0}")]
    Workspace(#[source] std::io::Error),

    /// Fetcher failed
    #[error("download error: {0}")]
    Fetch(#[source] FetchError),

    /// The package identifier does not map to a directory of its own
    #[error("invalid hub destination: {0}")]
    Destination(#[source] PurlError),

    /// Fetch exceeded the configured timeout
    #[error("download timed out after {timeout_secs}s")]
    FetchTimeout { timeout_secs: u64 },

    /// Cancellation token fired
    #[error("crawl cancelled")]
    Cancelled,

    /// Package directory could not be reset
    #[error("failed to reset the directory: {0}")]
    Reconcile(#[source] std::io::Error),

    /// Walking the checkout failed
    #[error("failed to walk the directory: {0}")]
    Walk(#[source] walkdir::Error),

    /// A candidate document is unreadable, malformed or has no statements
    #[error("invalid VEX file: {0}")]
    Document(#[source] DocumentError),

    /// Accepted document could not be moved into the hub
    #[error("failed to move VEX file to {}: {source}", .to.display())]
    Relocate {
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The walk finished without accepting a single document
    #[error("no VEX file found")]
    NoVexFound,

    /// Hub status could not be read
    #[error("failed to inspect the hub repository: {0}")]
    ChangeDetection(#[source] VcsError),

    /// Manifest could not be written
    #[error("failed to write the manifest: {0}")]
    ManifestWrite(#[source] ManifestError),

    /// Blocking scan task panicked or was aborted
    #[error("scan task failed: {0}")]
    Scan(#[source] tokio::task::JoinError),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Crawls one package at a time into a VEX hub.
///
/// # Thread Safety
///
/// The crawler is `Send + Sync` and holds no per-crawl state, so it can be
/// shared across tasks. Crawls that write into the same hub checkout must be
/// serialized by the caller: one crawl's half-reset directory would otherwise
/// show up in another crawl's change detection.
///
/// # Example
///
/// ```ignore
/// use vexhub_crawler::{Crawler, GitCli, GitFetcher};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// let crawler = Crawler::new(GitFetcher::new(), Arc::new(GitCli::new()));
/// let purl = "pkg:npm/left-pad".parse()?;
/// let url = "https://github.com/left-pad/left-pad".parse()?;
/// crawler
///     .crawl_package(&CancellationToken::new(), "vexhub".as_ref(), &url, &purl)
///     .await?;
/// ```
pub struct Crawler<F>
where
    F: Fetcher,
{
    /// Materializes package sources
    fetcher: F,

    /// Reads checkout remotes and hub status
    vcs: Arc<dyn VersionControl>,

    /// Upper bound for one fetch (default: 5 minutes)
    fetch_timeout: Duration,

    /// Only remotes on this host get permalinks
    permalink_host: String,

    /// Parent for scratch workspaces; the system temp dir when `None`
    workspace_dir: Option<PathBuf>,
}

impl<F> Crawler<F>
where
    F: Fetcher,
{
    /// Creates a crawler with default settings.
    ///
    /// Default configuration:
    /// - Fetch timeout: 5 minutes
    /// - Permalink host: `github.com`
    /// - Workspaces in the system temp directory
    pub fn new(fetcher: F, vcs: Arc<dyn VersionControl>) -> Self {
        Self::from_config(fetcher, vcs, &CrawlerConfig::default())
    }

    pub fn from_config(fetcher: F, vcs: Arc<dyn VersionControl>, config: &CrawlerConfig) -> Self {
        Self {
            fetcher,
            vcs,
            fetch_timeout: config.fetch_timeout(),
            permalink_host: config.permalink_host.clone(),
            workspace_dir: config.workspace_dir.clone(),
        }
    }

    /// Sets the upper bound for fetching one package.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the code-hosting host permalinks are built for.
    pub fn with_permalink_host(mut self, host: impl Into<String>) -> Self {
        self.permalink_host = host.into();
        self
    }

    /// Places scratch workspaces under `dir`.
    ///
    /// Keeping workspaces on the hub's filesystem lets accepted documents be
    /// renamed instead of copied.
    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    /// Crawls one package and publishes its VEX documents into the hub.
    ///
    /// Runs the stages in order:
    /// 1. Fetch the source into a fresh [`Workspace`]
    /// 2. Resolve a commit permalink (optional)
    /// 3. Reset the package directory, keeping its manifest
    /// 4. Walk the checkout (or its `.vex/` directory), validate candidates
    ///    and move accepted ones into the hub
    /// 5. Write a new manifest unless the hub reports no document change
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if `purl` has no directory of its own
    /// ([`CrawlErrorKind::Destination`]), if any stage fails, if the walk
    /// accepts no document ([`CrawlErrorKind::NoVexFound`]) or if `cancel`
    /// fires while fetching. Documents about other packages are skipped, not errors.
    #[instrument(skip_all, fields(purl = %purl, url = %location))]
    pub async fn crawl_package(
        &self,
        cancel: &CancellationToken,
        hub_root: &Path,
        location: &SourceLocation,
        purl: &PackageUrl,
    ) -> Result<CrawlOutcome, CrawlError> {
        let mut context = CrawlContext::new(purl, location);
        if cancel.is_cancelled() {
            return Err(context.error(CrawlErrorKind::Cancelled));
        }

        let dir = purl
            .hub_dir(hub_root)
            .map_err(|e| context.error(CrawlErrorKind::Destination(e)))?;
        context.dir = Some(dir.clone());

        // ====================================================================
        // Stage 1: Fetch
        // ====================================================================

        let workspace = Workspace::create(self.workspace_dir.as_deref(), &purl.name)
            .map_err(|e| context.error(CrawlErrorKind::Workspace(e)))?;

        info!(fetcher = self.fetcher.name(), "Fetching package source");
        let fetch_start = Instant::now();
        let fetch = timeout(
            self.fetch_timeout,
            self.fetcher.fetch(cancel, location, &workspace.checkout),
        );
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(context.error(CrawlErrorKind::Cancelled)),
            fetched = fetch => fetched,
        };
        match fetched {
            Err(_) => {
                return Err(context.error(CrawlErrorKind::FetchTimeout {
                    timeout_secs: self.fetch_timeout.as_secs(),
                }))
            }
            Ok(Err(FetchError::Cancelled(_))) => {
                return Err(context.error(CrawlErrorKind::Cancelled))
            }
            Ok(Err(e)) => return Err(context.error(CrawlErrorKind::Fetch(e))),
            Ok(Ok(())) => {}
        }
        context.stage = CrawlStage::Fetched;
        info!(
            duration_ms = fetch_start.elapsed().as_millis() as u64,
            "Fetch completed"
        );

        let permalink =
            permalink::resolve(self.vcs.as_ref(), &workspace.checkout, &self.permalink_host);
        if let Some(link) = &permalink {
            debug!(permalink = %link, "Resolved permalink");
            context.permalink = Some(link.to_string());
        }

        if cancel.is_cancelled() {
            return Err(context.error(CrawlErrorKind::Cancelled));
        }

        // ====================================================================
        // Stages 2-4: Reconcile, Scan, Publish
        // ====================================================================
        //
        // Filesystem and git work is blocking and strictly ordered, so it runs
        // as one task. `workspace` stays alive here until the task finishes.

        let scan = Scan {
            vcs: Arc::clone(&self.vcs),
            hub_root: hub_root.to_path_buf(),
            dir,
            checkout: workspace.checkout.clone(),
            purl: purl.clone(),
            location: location.clone(),
            permalink,
            context: context.clone(),
        };
        let span = tracing::Span::current();
        let outcome = tokio::task::spawn_blocking(move || span.in_scope(|| scan.run()))
            .await
            .map_err(|e| context.error(CrawlErrorKind::Scan(e)))?;

        drop(workspace);
        outcome
    }
}

/// Blocking half of a crawl.
struct Scan {
    vcs: Arc<dyn VersionControl>,
    hub_root: PathBuf,
    dir: PathBuf,
    checkout: PathBuf,
    purl: PackageUrl,
    location: SourceLocation,
    permalink: Option<Url>,
    context: CrawlContext,
}

impl Scan {
    fn run(mut self) -> Result<CrawlOutcome, CrawlError> {
        let dir = self.dir.clone();

        reset_dir(&dir).map_err(|e| self.context.error(CrawlErrorKind::Reconcile(e)))?;
        self.context.stage = CrawlStage::Reconciled;

        let sources = self.collect(&dir)?;
        if sources.is_empty() {
            return Err(self.context.error(CrawlErrorKind::NoVexFound));
        }

        self.context.stage = CrawlStage::Publishing;
        let changed = has_changes(self.vcs.as_ref(), &self.hub_root, &dir)
            .map_err(|e| self.context.error(CrawlErrorKind::ChangeDetection(e)))?;
        if !changed {
            info!(documents = sources.len(), "No changes in the VEX directory");
            return Ok(CrawlOutcome::Unchanged {
                dir,
                documents: sources.len(),
            });
        }

        let manifest = Manifest {
            id: self.purl.to_string(),
            sources,
        };
        manifest
            .write(&dir.join(MANIFEST_FILE_NAME))
            .map_err(|e| self.context.error(CrawlErrorKind::ManifestWrite(e)))?;
        info!(documents = manifest.sources.len(), "Manifest written");

        Ok(CrawlOutcome::Updated { dir, manifest })
    }

    /// Walks the checkout, moving accepted documents into `dir`.
    ///
    /// Only matched regular files are moved, never directories, so the walk
    /// never loses track of a directory it is still visiting.
    fn collect(&mut self, dir: &Path) -> Result<Vec<Source>, CrawlError> {
        self.context.stage = CrawlStage::Scanning;
        let root = self.walk_root();
        let purl = self.purl.to_string();
        let mut sources = Vec::new();

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| self.context.error(CrawlErrorKind::Walk(e)))?;
            if !entry.file_type().is_file() || !is_vex_file(entry.path()) {
                continue;
            }

            // Relative to the repository root, not to `.vex/`.
            let rel_path = entry
                .path()
                .strip_prefix(&self.checkout)
                .unwrap_or(entry.path())
                .to_path_buf();
            let file_context = self.context.with_file(&rel_path);

            info!(path = %rel_path.display(), "Parsing VEX file");
            match validate(entry.path(), &purl) {
                Ok(Verdict::Accepted) => {}
                Ok(Verdict::Mismatch) => {
                    info!(path = %rel_path.display(), "PURL does not match");
                    continue;
                }
                Err(e) => return Err(file_context.error(CrawlErrorKind::Document(e))),
            }

            let to = dir.join(entry.file_name());
            if to.exists() {
                warn!(
                    path = %rel_path.display(),
                    to = %to.display(),
                    "Another accepted VEX file has the same name; overwriting it"
                );
            }
            relocate(entry.path(), &to).map_err(|source| {
                file_context.error(CrawlErrorKind::Relocate {
                    to: to.clone(),
                    source,
                })
            })?;

            sources.push(Source {
                path: entry.file_name().to_string_lossy().into_owned(),
                url: source_url(self.permalink.as_ref(), &rel_path, &self.location),
            });
        }

        Ok(sources)
    }

    fn walk_root(&self) -> PathBuf {
        let mut root = self.checkout.clone();
        if let Some(subdir) = self.location.subdir() {
            root.push(subdir);
        }
        let vex_dir = root.join(VEX_DIR_NAME);
        if vex_dir.is_dir() {
            debug!(root = %vex_dir.display(), "Using the .vex directory as walk root");
            return vex_dir;
        }
        root
    }
}

/// Moves `from` to `to`, copying when they sit on different filesystems.
fn relocate(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => match std::fs::copy(from, to) {
            Ok(_) => std::fs::remove_file(from),
            Err(_) => Err(rename_err),
        },
    }
}

/// URL recorded in the manifest for a document at `rel_path`.
fn source_url(permalink: Option<&Url>, rel_path: &Path, location: &SourceLocation) -> String {
    let Some(base) = permalink else {
        return location.to_string();
    };

    let segments: Vec<String> = rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let mut url = base.clone();
    let path = format!("{}/{}", base.path().trim_end_matches('/'), segments.join("/"));
    url.set_path(&path);
    url.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let workspace = Workspace::create(None, "left-pad").unwrap();
        let root = workspace.checkout.parent().unwrap().to_path_buf();
        assert!(root.is_dir());
        assert!(!workspace.checkout.exists());
        assert!(workspace.checkout.ends_with("left-pad"));

        drop(workspace);
        assert!(!root.exists());
    }

    #[test]
    fn test_workspace_name_is_a_single_component() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(Some(parent.path()), "../evil/name").unwrap();
        assert!(workspace.checkout.starts_with(parent.path()));
        assert_eq!(workspace.checkout.file_name().unwrap(), ".._evil_name");

        let workspace = Workspace::create(Some(parent.path()), "..").unwrap();
        assert_eq!(workspace.checkout.file_name().unwrap(), "src");
    }

    #[test]
    fn test_source_url_with_permalink() {
        let base = Url::parse("https://github.com/o/r/blob/abc").unwrap();
        let location = SourceLocation::parse("https://github.com/o/r").unwrap();
        assert_eq!(
            source_url(Some(&base), Path::new(".vex/vex.json"), &location),
            "https://github.com/o/r/blob/abc/.vex/vex.json"
        );
    }

    #[test]
    fn test_source_url_falls_back_to_location() {
        let location = SourceLocation::parse("https://gitlab.com/o/r//sub?ref=main").unwrap();
        assert_eq!(
            source_url(None, Path::new("sub/vex.json"), &location),
            "https://gitlab.com/o/r//sub?ref=main"
        );
    }

    #[test]
    fn test_relocate_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.vex.json");
        let to = dir.path().join("b.vex.json");
        std::fs::write(&from, "{}").unwrap();

        relocate(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "{}");
    }

    #[test]
    fn test_context_display() {
        let purl: PackageUrl = "pkg:npm/left-pad".parse().unwrap();
        let location = SourceLocation::parse("https://github.com/o/r").unwrap();
        let context = CrawlContext::new(&purl, &location).with_file(Path::new("vex.json"));
        assert_eq!(
            context.to_string(),
            "purl=pkg:npm/left-pad url=https://github.com/o/r stage=init path=vex.json"
        );
    }
}
