//! Minimal OpenVEX document model.
//!
//! Only what the crawler needs is modeled: the statements and the product
//! identifiers they reference. Status, justification and vulnerability
//! details are carried through untouched because the documents are relocated
//! byte for byte, never re-serialized.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a VEX document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The file could not be read
    #[error("failed to open VEX file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a VEX document
    #[error("failed to parse VEX file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The document parsed but carries no statements
    #[error("no statements found in {path}")]
    NoStatements { path: PathBuf },
}

/// A parsed VEX document.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub products: Vec<Product>,
}

/// A product reference.
///
/// OpenVEX 0.2 uses objects with an `@id`; earlier drafts listed bare
/// identifier strings. Both shapes are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Product {
    Component(Component),
    Bare(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    #[serde(rename = "@id", default)]
    pub id: Option<String>,

    #[serde(default)]
    pub identifiers: Identifiers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Identifiers {
    pub purl: Option<String>,
}

impl Product {
    /// Identifiers under which this product can be matched against a PURL.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        let (primary, purl) = match self {
            Product::Bare(id) => (Some(id.as_str()), None),
            Product::Component(c) => (c.id.as_deref(), c.identifiers.purl.as_deref()),
        };
        primary.into_iter().chain(purl)
    }
}

impl Document {
    /// Loads a document from disk.
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let bytes = std::fs::read(path).map_err(|source| DocumentError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| DocumentError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every product identifier referenced by any statement, in document order.
    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.statements
            .iter()
            .flat_map(|statement| statement.products.iter())
            .flat_map(Product::ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_openvex_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openvex.json");
        std::fs::write(
            &path,
            r#"{
                "@context": "https://openvex.dev/ns/v0.2.0",
                "@id": "https://openvex.dev/docs/example/vex-9fb3463de1b5",
                "statements": [
                    {
                        "vulnerability": {"name": "CVE-2023-1234"},
                        "products": [
                            {"@id": "pkg:npm/left-pad@1.0.0"},
                            {"@id": "urn:example", "identifiers": {"purl": "pkg:npm/right-pad@2.0.0"}}
                        ],
                        "status": "not_affected",
                        "justification": "vulnerable_code_not_present"
                    }
                ]
            }"#,
        )
        .unwrap();

        let doc = Document::open(&path).unwrap();
        assert_eq!(doc.statements.len(), 1);
        let ids: Vec<&str> = doc.product_ids().collect();
        assert_eq!(
            ids,
            vec!["pkg:npm/left-pad@1.0.0", "urn:example", "pkg:npm/right-pad@2.0.0"]
        );
    }

    #[test]
    fn test_open_legacy_string_products() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vex.json");
        std::fs::write(
            &path,
            r#"{"statements": [{"products": ["pkg:golang/example.com/mod@v1.0.0"]}]}"#,
        )
        .unwrap();

        let doc = Document::open(&path).unwrap();
        assert_eq!(
            doc.product_ids().collect::<Vec<_>>(),
            vec!["pkg:golang/example.com/mod@v1.0.0"]
        );
    }

    #[test]
    fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.vex.json");
        assert!(matches!(
            Document::open(&missing),
            Err(DocumentError::Open { .. })
        ));

        let garbage = dir.path().join("garbage.vex.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            Document::open(&garbage),
            Err(DocumentError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_statements_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vex.json");
        std::fs::write(&path, r#"{"@id": "x"}"#).unwrap();
        assert!(Document::open(&path).unwrap().statements.is_empty());
    }
}
