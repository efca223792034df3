//! Repository discovery and creation under a root directory.

use crate::{Repository, Result, StorageError};
use std::fs;
use std::path::{Path, PathBuf};

/// Looks up and creates repositories by name.
///
/// Every call opens fresh handles; implementations must not cache
/// repository state between calls.
pub trait RepoDirectory: Send + Sync {
    /// Directory the repositories live in.
    fn root(&self) -> &Path;

    /// Lists every repository, sorted by name.
    fn list(&self) -> Result<Vec<Repository>>;

    /// Opens a repository by name. A trailing `.git` is accepted.
    fn open(&self, name: &str) -> Result<Repository>;

    /// Creates an empty bare repository. Creating an existing name is a no-op.
    fn create(&self, name: &str) -> Result<()>;
}

/// [`RepoDirectory`] over a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRepoDirectory {
    root: PathBuf,
}

impl FsRepoDirectory {
    /// Creates a directory rooted at `root`. The path does not need to exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rejects names that could escape the root or hide as dotfiles.
    pub fn validate_name(name: &str) -> Result<&str> {
        let name = name.trim();
        let base = name.strip_suffix(".git").unwrap_or(name);
        if base.is_empty()
            || base.starts_with('.')
            || base.contains(['/', '\\', '\0'])
            || base.contains("..")
        {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(base)
    }

    fn candidates(&self, base: &str) -> [PathBuf; 2] {
        [self.root.join(base), self.root.join(format!("{}.git", base))]
    }
}

impl RepoDirectory for FsRepoDirectory {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list(&self) -> Result<Vec<Repository>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut repos = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match Repository::open(entry.path()) {
                Ok(repo) => repos.push(repo),
                Err(StorageError::RepoNotFound(_)) => {
                    tracing::trace!(path = %entry.path().display(), "Skipping non-repository directory");
                }
                Err(e) => return Err(e),
            }
        }

        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    fn open(&self, name: &str) -> Result<Repository> {
        let base = Self::validate_name(name)?;
        for path in self.candidates(base) {
            if path.is_dir() {
                match Repository::open(&path) {
                    Err(StorageError::RepoNotFound(_)) => continue,
                    other => return other,
                }
            }
        }
        Err(StorageError::RepoNotFound(base.to_string()))
    }

    fn create(&self, name: &str) -> Result<()> {
        let base = Self::validate_name(name)?;
        if self.candidates(base).iter().any(|p| p.exists()) {
            tracing::debug!(repo = base, "Repository already exists");
            return Ok(());
        }
        fs::create_dir_all(&self.root)?;
        Repository::init_bare(self.root.join(format!("{}.git", base)))?;
        tracing::info!(repo = base, "Created repository");
        Ok(())
    }
}
