pub mod config;
pub mod crawl;
pub mod executor;
pub mod fetch;
pub mod locator;
pub mod model;
pub mod purl;
pub mod traits;
pub mod vcs;
pub mod vex;

// Re-export common types for convenience
pub use config::CrawlerConfig;
pub use crawl::{CrawlError, CrawlErrorKind, CrawlOutcome, Crawler};
pub use executor::*;
pub use fetch::GitFetcher;
pub use locator::SourceLocation;
pub use model::*;
pub use purl::PackageUrl;
pub use traits::*;
pub use vcs::{GitCli, VersionControl};
