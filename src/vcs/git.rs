use super::{FileStatus, Repository, StatusCode, VcsError, VersionControl};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: OsString,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: OsString::from("git"),
        }
    }

    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }
}

impl VersionControl for GitCli {
    fn open(&self, path: &Path) -> Result<Box<dyn Repository>, VcsError> {
        // `.git` is a directory in clones and a file in linked worktrees.
        if !path.join(".git").exists() {
            return Err(VcsError::NotARepository(path.to_path_buf()));
        }
        Ok(Box::new(GitRepository {
            program: self.program.clone(),
            root: path.to_path_buf(),
        }))
    }
}

struct GitRepository {
    program: OsString,
    root: PathBuf,
}

impl GitRepository {
    fn output(&self, args: &[&str]) -> Result<Output, VcsError> {
        Ok(Command::new(&self.program)
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()?)
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, VcsError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(self.command_error(args, &output));
        }
        Ok(output.stdout)
    }

    fn command_error(&self, args: &[&str], output: &Output) -> VcsError {
        VcsError::Command {
            command: args.join(" "),
            dir: self.root.clone(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

impl Repository for GitRepository {
    fn remote_urls(&self, name: &str) -> Result<Vec<String>, VcsError> {
        let key = format!("remote.{name}.url");
        let args = ["config", "--get-all", key.as_str()];
        let output = self.output(&args)?;
        // `git config` exits with 1 when the key is not set.
        if output.status.code() == Some(1) {
            return Err(VcsError::RemoteNotFound(name.to_string()));
        }
        if !output.status.success() {
            return Err(self.command_error(&args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn head_revision(&self) -> Result<String, VcsError> {
        let stdout = self.run(&["rev-parse", "--verify", "HEAD"])?;
        let revision = String::from_utf8_lossy(&stdout).trim().to_string();
        if revision.is_empty() {
            return Err(VcsError::Output("empty HEAD revision".to_string()));
        }
        Ok(revision)
    }

    fn worktree_status(&self) -> Result<Vec<FileStatus>, VcsError> {
        let stdout = self.run(&["status", "--porcelain=v1", "-z", "--untracked-files=all"])?;
        parse_porcelain(&stdout)
    }
}

/// Parses `git status --porcelain=v1 -z` output.
///
/// Entries are `XY <path>` separated by NUL; renames and copies are followed
/// by an extra NUL-terminated field holding the original path.
fn parse_porcelain(output: &[u8]) -> Result<Vec<FileStatus>, VcsError> {
    let mut statuses = Vec::new();
    let mut fields = output.split(|b| *b == 0).filter(|f| !f.is_empty());

    while let Some(entry) = fields.next() {
        if entry.len() < 4 || entry[2] != b' ' {
            return Err(VcsError::Output(
                String::from_utf8_lossy(entry).into_owned(),
            ));
        }
        let staging = status_code(entry[0]);
        let worktree = status_code(entry[1]);
        if matches!(staging, StatusCode::Renamed | StatusCode::Copied) {
            fields.next();
        }
        statuses.push(FileStatus {
            path: String::from_utf8_lossy(&entry[3..]).into_owned(),
            staging,
            worktree,
        });
    }
    Ok(statuses)
}

fn status_code(code: u8) -> StatusCode {
    match code {
        b'M' => StatusCode::Modified,
        b'A' => StatusCode::Added,
        b'D' => StatusCode::Deleted,
        b'R' => StatusCode::Renamed,
        b'C' => StatusCode::Copied,
        b'U' => StatusCode::UpdatedButUnmerged,
        b'T' => StatusCode::TypeChanged,
        b'?' => StatusCode::Untracked,
        b'!' => StatusCode::Ignored,
        _ => StatusCode::Unmodified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args([
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn test_parse_porcelain_entries() {
        let output = b" M pkg/npm/a/vex.json\0?? pkg/npm/a/new.vex.json\0R  new.json\0old.json\0 D gone.json\0";
        let statuses = parse_porcelain(output).unwrap();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[0].path, "pkg/npm/a/vex.json");
        assert_eq!(statuses[0].staging, StatusCode::Unmodified);
        assert_eq!(statuses[0].worktree, StatusCode::Modified);
        assert_eq!(statuses[1].worktree, StatusCode::Untracked);
        assert_eq!(statuses[2].path, "new.json");
        assert_eq!(statuses[2].staging, StatusCode::Renamed);
        assert_eq!(statuses[3].path, "gone.json");
        assert_eq!(statuses[3].worktree, StatusCode::Deleted);
    }

    #[test]
    fn test_parse_porcelain_empty_and_malformed() {
        assert!(parse_porcelain(b"").unwrap().is_empty());
        assert!(matches!(parse_porcelain(b"garbage"), Err(VcsError::Output(_))));
    }

    #[test]
    fn test_open_requires_repository_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitCli::new().open(dir.path()),
            Err(VcsError::NotARepository(_))
        ));
    }

    #[test]
    fn test_repository_queries() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "--quiet"]);
        git(
            root,
            &["remote", "add", "origin", "https://github.com/owner/repo.git"],
        );
        std::fs::write(root.join("tracked.json"), "{}").unwrap();
        git(root, &["add", "tracked.json"]);
        git(root, &["commit", "--quiet", "-m", "init"]);

        let repo = GitCli::new().open(root).unwrap();
        assert_eq!(
            repo.remote_urls("origin").unwrap(),
            vec!["https://github.com/owner/repo.git".to_string()]
        );
        assert!(matches!(
            repo.remote_urls("upstream"),
            Err(VcsError::RemoteNotFound(_))
        ));
        assert_eq!(repo.head_revision().unwrap().len(), 40);
        assert!(repo.worktree_status().unwrap().is_empty());

        std::fs::write(root.join("tracked.json"), "{\"changed\": true}").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("new.json"), "{}").unwrap();

        let mut statuses = repo.worktree_status().unwrap();
        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].path, "sub/new.json");
        assert_eq!(statuses[0].worktree, StatusCode::Untracked);
        assert_eq!(statuses[1].path, "tracked.json");
        assert_eq!(statuses[1].worktree, StatusCode::Modified);
    }
}
