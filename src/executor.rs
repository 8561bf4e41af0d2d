use crate::crawl::{CrawlError, CrawlErrorKind, CrawlOutcome, Crawler};
use crate::locator::SourceLocation;
use crate::purl::PackageUrl;
use crate::traits::Fetcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Runs crawls against one hub checkout, one at a time.
///
/// Crawls sharing a hub must not overlap: reconciliation of one package
/// would show up in another's change detection. The executor holds a single
/// permit per hub so clones of it can be used from several tasks.
pub struct CrawlExecutor<F: Fetcher> {
    crawler: Arc<Crawler<F>>,
    hub_root: PathBuf,
    hub_permit: Arc<Semaphore>,
}

impl<F: Fetcher> Clone for CrawlExecutor<F> {
    fn clone(&self) -> Self {
        Self {
            crawler: Arc::clone(&self.crawler),
            hub_root: self.hub_root.clone(),
            hub_permit: Arc::clone(&self.hub_permit),
        }
    }
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<(String, CrawlError)>,
    /// Packages not attempted because the run was cancelled
    pub skipped: Vec<String>,
}

impl CrawlReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

impl<F: Fetcher> CrawlExecutor<F> {
    pub fn new(crawler: Crawler<F>, hub_root: impl Into<PathBuf>) -> Self {
        Self {
            crawler: Arc::new(crawler),
            hub_root: hub_root.into(),
            hub_permit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn hub_root(&self) -> &Path {
        &self.hub_root
    }

    /// Crawls one package once the hub is free.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        location: &SourceLocation,
        purl: &PackageUrl,
    ) -> Result<CrawlOutcome, CrawlError> {
        let _permit = tokio::select! {
            permit = self.hub_permit.acquire() => permit.map_err(|_| cancelled(location, purl))?,
            _ = cancel.cancelled() => return Err(cancelled(location, purl)),
        };

        self.crawler
            .crawl_package(cancel, &self.hub_root, location, purl)
            .await
    }

    /// Crawls every package in order, logging failures and carrying on.
    ///
    /// Stops early when `cancel` fires; the remaining packages are reported
    /// as skipped.
    #[instrument(skip_all, fields(hub = %self.hub_root.display(), packages = packages.len()))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        packages: &[(PackageUrl, SourceLocation)],
    ) -> CrawlReport {
        let mut report = CrawlReport::default();

        for (purl, location) in packages {
            let id = purl.to_string();
            if cancel.is_cancelled() {
                report.skipped.push(id);
                continue;
            }

            info!(purl = %id, url = %location, "Crawling package");
            match self.execute(cancel, location, purl).await {
                Ok(CrawlOutcome::Updated { manifest, .. }) => {
                    info!(purl = %id, documents = manifest.sources.len(), "Package updated");
                    report.updated.push(id);
                }
                Ok(CrawlOutcome::Unchanged { .. }) => report.unchanged.push(id),
                Err(e) if e.is_cancelled() => {
                    warn!(purl = %id, "Crawl cancelled");
                    report.skipped.push(id);
                }
                Err(e) => {
                    error!(purl = %id, error = %e, "Crawl failed");
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Finished crawl run"
        );
        report
    }
}

fn cancelled(location: &SourceLocation, purl: &PackageUrl) -> CrawlError {
    CrawlError {
        context: crate::crawl::CrawlContext::new(purl, location),
        kind: CrawlErrorKind::Cancelled,
    }
}
