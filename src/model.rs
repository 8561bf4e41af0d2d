use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-package provenance file kept next to the VEX documents.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Provenance of the VEX documents published for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String, // canonical PURL of the package
    pub sources: Vec<Source>,
}

/// Where one published document came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub path: String, // file name inside the package directory
    pub url: String,  // commit-pinned permalink, or the source locator
}

impl Manifest {
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json).map_err(|source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
