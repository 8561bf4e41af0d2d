use crate::locator::SourceLocation;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch of {url} failed: {message}")]
    Failed { url: String, message: String },
    #[error("fetch of {0} was cancelled")]
    Cancelled(String),
    #[error("unsupported source location: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short name used in logs (e.g., "git").
    fn name(&self) -> &str;

    /// Materializes the source tree behind `location` into `dest`.
    ///
    /// `dest` does not exist yet; its parent does. Implementations must stop
    /// promptly once `cancel` fires and report [`FetchError::Cancelled`].
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        location: &SourceLocation,
        dest: &Path,
    ) -> Result<(), FetchError>;
}
