use crate::model::MANIFEST_FILE_NAME;
use crate::vcs::{StatusCode, VcsError, VersionControl};
use std::path::Path;

/// Reports whether the package directory `dir` differs from what the hub at
/// `hub_root` has committed, ignoring the manifest.
///
/// The manifest is left out because its URLs move with every crawl even when
/// no document changed. Failing to read the hub status is an error: treating
/// it as "unchanged" could hold back a real update forever.
pub fn has_changes(vcs: &dyn VersionControl, hub_root: &Path, dir: &Path) -> Result<bool, VcsError> {
    let repo = vcs.open(hub_root)?;
    let statuses = repo.worktree_status()?;
    let relative = dir.strip_prefix(hub_root).unwrap_or(dir);

    Ok(statuses.iter().any(|status| {
        let path = Path::new(&status.path);
        path.starts_with(relative)
            && status.worktree != StatusCode::Unmodified
            && path.file_name().is_some_and(|name| name != MANIFEST_FILE_NAME)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::{FileStatus, Repository};
    use std::path::PathBuf;

    struct StatusRepo(Vec<FileStatus>);

    impl Repository for StatusRepo {
        fn remote_urls(&self, name: &str) -> Result<Vec<String>, VcsError> {
            Err(VcsError::RemoteNotFound(name.to_string()))
        }

        fn head_revision(&self) -> Result<String, VcsError> {
            Ok("abc".to_string())
        }

        fn worktree_status(&self) -> Result<Vec<FileStatus>, VcsError> {
            Ok(self.0.clone())
        }
    }

    struct StatusVcs(Option<Vec<FileStatus>>);

    impl VersionControl for StatusVcs {
        fn open(&self, path: &Path) -> Result<Box<dyn Repository>, VcsError> {
            match &self.0 {
                Some(statuses) => Ok(Box::new(StatusRepo(statuses.clone()))),
                None => Err(VcsError::NotARepository(PathBuf::from(path))),
            }
        }
    }

    fn status(path: &str, worktree: StatusCode) -> FileStatus {
        FileStatus {
            path: path.to_string(),
            staging: StatusCode::Unmodified,
            worktree,
        }
    }

    fn check(statuses: Vec<FileStatus>) -> bool {
        let hub = Path::new("/hub");
        has_changes(&StatusVcs(Some(statuses)), hub, &hub.join("pkg/npm/left-pad")).unwrap()
    }

    #[test]
    fn test_clean_tree_has_no_changes() {
        assert!(!check(vec![]));
    }

    #[test]
    fn test_document_changes_are_detected() {
        assert!(check(vec![status("pkg/npm/left-pad/vex.json", StatusCode::Modified)]));
        assert!(check(vec![status("pkg/npm/left-pad/new.vex.json", StatusCode::Untracked)]));
        assert!(check(vec![status("pkg/npm/left-pad/old.vex.json", StatusCode::Deleted)]));
    }

    #[test]
    fn test_manifest_changes_are_ignored() {
        assert!(!check(vec![status(
            "pkg/npm/left-pad/manifest.json",
            StatusCode::Modified
        )]));
        assert!(check(vec![
            status("pkg/npm/left-pad/manifest.json", StatusCode::Modified),
            status("pkg/npm/left-pad/openvex.json", StatusCode::Modified),
        ]));
    }

    #[test]
    fn test_other_packages_are_ignored() {
        assert!(!check(vec![
            status("pkg/npm/right-pad/vex.json", StatusCode::Modified),
            status("pkg/npm/left-pad-extra/vex.json", StatusCode::Untracked),
            status("README.md", StatusCode::Modified),
        ]));
    }

    #[test]
    fn test_staged_only_changes_are_ignored() {
        let staged = FileStatus {
            path: "pkg/npm/left-pad/vex.json".to_string(),
            staging: StatusCode::Added,
            worktree: StatusCode::Unmodified,
        };
        assert!(!check(vec![staged]));
    }

    #[test]
    fn test_unreadable_hub_is_an_error() {
        let hub = Path::new("/hub");
        assert!(has_changes(&StatusVcs(None), hub, &hub.join("pkg/npm/x")).is_err());
    }
}
