//! Crawler configuration.
//!
//! Loaded from a TOML file; every key is optional.
//!
//! ```toml
//! fetch_timeout_secs = 300
//! permalink_host = "github.com"
//! workspace_dir = "/var/tmp/vexhub"
//!
//! [[packages]]
//! purl = "pkg:npm/left-pad"
//! url = "https://github.com/left-pad/left-pad"
//! ```

use crate::locator::SourceLocation;
use crate::purl::{PackageUrl, PurlError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PERMALINK_HOST: &str = "github.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid package entry: {0}")]
    Package(#[from] PurlError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Upper bound for fetching one package, in seconds
    pub fetch_timeout_secs: u64,

    /// Code-hosting host permalinks are built for
    pub permalink_host: String,

    /// Parent directory for scratch workspaces
    pub workspace_dir: Option<PathBuf>,

    /// Packages crawled by a batch run
    pub packages: Vec<PackageEntry>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            permalink_host: DEFAULT_PERMALINK_HOST.to_string(),
            workspace_dir: None,
            packages: Vec::new(),
        }
    }
}

/// One package to crawl.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageEntry {
    pub purl: String,
    pub url: SourceLocation,
}

impl PackageEntry {
    pub fn package_url(&self) -> Result<PackageUrl, PurlError> {
        self.purl.parse()
    }
}

impl CrawlerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Parses every package entry, failing on the first invalid PURL.
    pub fn packages(&self) -> Result<Vec<(PackageUrl, SourceLocation)>, ConfigError> {
        self.packages
            .iter()
            .map(|entry| Ok((entry.package_url()?, entry.url.clone())))
            .collect()
    }
}
