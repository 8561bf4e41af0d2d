//! Crawl module - per-package VEX discovery and publishing.
//!
//! This module provides the pieces a crawl is made of:
//! - **Matcher**: [`matcher::is_vex_file`] picks candidate file names
//! - **Validator**: [`validate::validate`] checks a document covers the package
//! - **Permalink**: [`permalink::resolve`] pins source URLs to a commit
//! - **Reconciler**: [`reconcile::reset_dir`] clears stale hub content
//! - **Change detection**: [`changes::has_changes`] ignores manifest-only churn
//! - **Pipeline**: [`Crawler`] sequences all of the above for one package

pub mod changes;
pub mod matcher;
pub mod permalink;
pub mod pipeline;
pub mod reconcile;
pub mod validate;

pub use pipeline::{
    CrawlContext, CrawlError, CrawlErrorKind, CrawlOutcome, CrawlStage, Crawler, Workspace,
    VEX_DIR_NAME,
};
pub use validate::Verdict;
