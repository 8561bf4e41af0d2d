//! Source locators.
//!
//! A locator names where a package's source lives, using the go-getter
//! conventions VEX hub configurations are written in:
//!
//! ```text
//! git::https://github.com/owner/repo//sub/dir?ref=v1.2.3
//! ```
//!
//! The optional `git::` prefix forces the git getter, `//` separates the
//! repository from a subdirectory, and `ref` selects a branch or tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Where a package's source tree is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceLocation {
    raw: String,
    repository: Url,
    subdir: Option<String>,
    git_ref: Option<String>,
}

impl SourceLocation {
    pub fn parse(input: &str) -> Result<Self, LocatorError> {
        let invalid = |reason: &str| LocatorError::InvalidUrl {
            url: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let without_getter = trimmed.strip_prefix("git::").unwrap_or(trimmed);
        let (base, query) = match without_getter.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (without_getter, None),
        };

        let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
        let (repository, subdir) = match base[authority_start..].find("//") {
            Some(idx) => {
                let split = authority_start + idx;
                (&base[..split], Some(&base[split + 2..]))
            }
            None => (base, None),
        };

        let mut repository = Url::parse(repository).map_err(|e| invalid(&e.to_string()))?;
        if repository.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL"));
        }

        let mut git_ref = None;
        let mut kept = Vec::new();
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            if key == "ref" {
                git_ref = Some(value.into_owned()).filter(|v| !v.is_empty());
            } else {
                kept.push((key.into_owned(), value.into_owned()));
            }
        }
        if kept.is_empty() {
            repository.set_query(None);
        } else {
            repository.query_pairs_mut().clear().extend_pairs(kept);
        }

        let subdir = subdir
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if subdir
            .as_deref()
            .is_some_and(|s| s.split('/').any(|seg| seg == ".."))
        {
            return Err(invalid("subdirectory escapes the repository"));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            repository,
            subdir,
            git_ref,
        })
    }

    /// URL handed to the fetcher, without subdirectory or `ref`.
    pub fn repository(&self) -> &Url {
        &self.repository
    }

    /// Subdirectory of the repository holding the package, if any.
    pub fn subdir(&self) -> Option<&str> {
        self.subdir.as_deref()
    }

    /// Branch or tag to check out, if any.
    pub fn git_ref(&self) -> Option<&str> {
        self.git_ref.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for SourceLocation {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SourceLocation {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SourceLocation> for String {
    fn from(location: SourceLocation) -> Self {
        location.raw
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
