use crate::purl;
use crate::vex::{Document, DocumentError};
use std::path::Path;

/// Outcome of validating a well-formed VEX document against a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A statement covers the package
    Accepted,
    /// The document is about some other product; skip it
    Mismatch,
}

/// Checks that the document at `path` makes statements about `purl`.
///
/// Unreadable documents and documents without statements are errors, since
/// they point at a broken publish. A document that only covers other
/// products is a [`Verdict::Mismatch`].
pub fn validate(path: &Path, purl: &str) -> Result<Verdict, DocumentError> {
    let document = Document::open(path)?;
    if document.statements.is_empty() {
        return Err(DocumentError::NoStatements {
            path: path.to_path_buf(),
        });
    }

    if document.product_ids().any(|id| purl::matches(purl, id)) {
        Ok(Verdict::Accepted)
    } else {
        Ok(Verdict::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_doc(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_matching_product_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(
            dir.path(),
            "openvex.json",
            r#"{"statements": [
                {"products": [{"@id": "pkg:npm/other@2.0.0"}]},
                {"products": [{"@id": "pkg:npm/left-pad@1.0.0"}]}
            ]}"#,
        );
        assert_eq!(
            validate(&path, "pkg:npm/left-pad@1.0.0").unwrap(),
            Verdict::Accepted
        );
        assert_eq!(validate(&path, "pkg:npm/left-pad").unwrap(), Verdict::Accepted);
    }

    #[test]
    fn test_foreign_products_are_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(
            dir.path(),
            "foo.vex.json",
            r#"{"statements": [{"products": [{"@id": "pkg:npm/other@2.0.0"}]}]}"#,
        );
        assert_eq!(
            validate(&path, "pkg:npm/left-pad@1.0.0").unwrap(),
            Verdict::Mismatch
        );
    }

    #[test]
    fn test_statement_without_products_is_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "vex.json", r#"{"statements": [{}]}"#);
        assert_eq!(
            validate(&path, "pkg:npm/left-pad").unwrap(),
            Verdict::Mismatch
        );
    }

    #[test]
    fn test_no_statements_is_an_error_not_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "vex.json", r#"{"statements": []}"#);
        assert!(matches!(
            validate(&path, "pkg:npm/left-pad"),
            Err(DocumentError::NoStatements { .. })
        ));
    }

    #[test]
    fn test_unparseable_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(dir.path(), "vex.json", "{");
        assert!(matches!(
            validate(&path, "pkg:npm/left-pad"),
            Err(DocumentError::Parse { .. })
        ));
    }
}
