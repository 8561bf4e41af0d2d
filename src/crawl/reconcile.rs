use crate::model::MANIFEST_FILE_NAME;
use std::io;
use std::path::Path;

/// Empties `dir` except for its manifest, then makes sure it exists.
///
/// A missing directory is fine. Run before any accepted document is moved in
/// so documents a previous crawl published but this one no longer finds do
/// not survive.
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => Some(entries),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    for entry in entries.into_iter().flatten() {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_dir() && entry.file_name() == MANIFEST_FILE_NAME {
            continue;
        }

        let path = entry.path();
        if file_type.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }

    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_only_manifest() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pkg/npm/left-pad");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE_NAME), "{}").unwrap();
        std::fs::write(dir.join("old.vex.json"), "{}").unwrap();
        std::fs::write(dir.join("nested/vex.json"), "{}").unwrap();

        reset_dir(&dir).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![MANIFEST_FILE_NAME.to_string()]);
        assert_eq!(std::fs::read_to_string(dir.join(MANIFEST_FILE_NAME)).unwrap(), "{}");
    }

    #[test]
    fn test_reset_creates_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pkg/pypi/requests");
        reset_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_removes_directory_named_like_manifest() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pkg");
        std::fs::create_dir_all(dir.join(MANIFEST_FILE_NAME)).unwrap();
        reset_dir(&dir).unwrap();
        assert!(!dir.join(MANIFEST_FILE_NAME).exists());
    }

    #[test]
    fn test_reset_is_independent_of_working_directory() {
        // Entries are removed by their full path; a same-named file next to
        // the process working directory must be left alone.
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("dest");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Cargo.toml"), "stale").unwrap();

        reset_dir(&dir).unwrap();

        assert!(!dir.join("Cargo.toml").exists());
        assert!(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml").exists());
    }
}
