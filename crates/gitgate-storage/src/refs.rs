//! Git reference management over the loose `refs/` tree and `packed-refs`.

use crate::{ObjectId, Result, StorageError};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// How deep symbolic refs are followed before giving up.
const MAX_SYMREF_DEPTH: usize = 5;

/// A git reference (branch, tag, or symbolic ref).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Direct reference to an object.
    Direct(ObjectId),
    /// Symbolic reference (e.g., HEAD -> refs/heads/main).
    Symbolic(String),
}

impl Reference {
    /// Returns the object ID if this is a direct reference.
    pub fn as_direct(&self) -> Option<ObjectId> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Symbolic(_) => None,
        }
    }

    fn parse(name: &str, content: &str) -> Result<Self> {
        let content = content.trim();
        if let Some(target) = content.strip_prefix("ref:") {
            return Ok(Self::Symbolic(target.trim().to_string()));
        }
        ObjectId::from_hex(content)
            .map(Self::Direct)
            .map_err(|_| StorageError::InvalidRef(format!("{}: {:?}", name, content)))
    }

    fn serialize(&self) -> String {
        match self {
            Self::Direct(id) => format!("{}\n", id),
            Self::Symbolic(target) => format!("ref: {}\n", target),
        }
    }
}

/// Reference store for one git directory. Every call goes to disk.
#[derive(Debug, Clone)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    /// Creates a reference store for a git directory.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    /// Checks that a name is `HEAD` or a well-formed name under `refs/`.
    pub fn check_name(name: &str) -> Result<()> {
        let invalid = || StorageError::InvalidRef(name.to_string());
        if name == "HEAD" {
            return Ok(());
        }
        if !name.starts_with("refs/") || name.ends_with('/') || name.ends_with(".lock") {
            return Err(invalid());
        }
        let bad_char = |c: char| c.is_ascii_control() || " ~^:?*[\\".contains(c);
        if name.contains("..") || name.contains("@{") || name.chars().any(bad_char) {
            return Err(invalid());
        }
        if name.split('/').any(|part| part.is_empty() || part.starts_with('.')) {
            return Err(invalid());
        }
        Ok(())
    }

    fn loose_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    /// Gets a reference by name.
    pub fn get(&self, name: &str) -> Result<Reference> {
        Self::check_name(name)?;
        match fs::read_to_string(self.loose_path(name)) {
            Ok(content) => return Reference::parse(name, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == std::io::ErrorKind::IsADirectory => {}
            Err(e) => return Err(e.into()),
        }
        self.read_packed()?
            .remove(name)
            .map(Reference::Direct)
            .ok_or_else(|| StorageError::RefNotFound(name.to_string()))
    }

    /// Resolves a reference to an object, following symbolic refs.
    /// Returns `None` when the chain ends at a ref that does not exist yet.
    pub fn resolve(&self, name: &str) -> Result<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..MAX_SYMREF_DEPTH {
            match self.get(&current) {
                Ok(Reference::Direct(id)) => return Ok(Some(id)),
                Ok(Reference::Symbolic(target)) => current = target,
                Err(StorageError::RefNotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::InvalidRef(format!(
            "{}: symbolic ref chain too deep",
            name
        )))
    }

    /// Resolves HEAD to the current commit, `None` on an unborn branch.
    pub fn resolve_head(&self) -> Result<Option<ObjectId>> {
        self.resolve("HEAD")
    }

    /// Returns the ref HEAD points at when it is symbolic.
    pub fn head_target(&self) -> Result<Option<String>> {
        match self.get("HEAD") {
            Ok(Reference::Symbolic(target)) => Ok(Some(target)),
            Ok(Reference::Direct(_)) | Err(StorageError::RefNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sets a reference to point to an object, without checking its old value.
    pub fn set(&self, name: &str, target: ObjectId) -> Result<()> {
        self.write(name, None, &Reference::Direct(target))
    }

    /// Sets a symbolic reference.
    pub fn set_symbolic(&self, name: &str, target: &str) -> Result<()> {
        Self::check_name(target)?;
        self.write(name, None, &Reference::Symbolic(target.to_string()))
    }

    /// Moves a reference from `expected` to `target` atomically.
    ///
    /// `expected` of [`ObjectId::ZERO`] requires the ref not to exist yet.
    /// Fails with [`StorageError::InvalidRef`] if the current value differs,
    /// and with [`StorageError::RefLocked`] if another writer holds the lock.
    pub fn compare_and_swap(&self, name: &str, expected: ObjectId, target: ObjectId) -> Result<()> {
        self.write(name, Some(expected), &Reference::Direct(target))
    }

    fn write(&self, name: &str, expected: Option<ObjectId>, value: &Reference) -> Result<()> {
        Self::check_name(name)?;
        let lock = RefLock::acquire(self.loose_path(name), name)?;
        if let Some(expected) = expected {
            self.check_current(name, expected)?;
        }
        lock.commit(&value.serialize())
    }

    fn check_current(&self, name: &str, expected: ObjectId) -> Result<()> {
        let current = match self.get(name) {
            Ok(reference) => reference.as_direct(),
            Err(StorageError::RefNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if current.unwrap_or(ObjectId::ZERO) != expected {
            return Err(StorageError::InvalidRef(format!(
                "{} is at {}, expected {}",
                name,
                current.unwrap_or(ObjectId::ZERO),
                expected
            )));
        }
        Ok(())
    }

    /// Deletes a reference, optionally checking its current value first.
    pub fn delete(&self, name: &str, expected: Option<ObjectId>) -> Result<()> {
        Self::check_name(name)?;
        let _lock = RefLock::acquire(self.loose_path(name), name)?;
        match expected {
            Some(expected) if !expected.is_zero() => self.check_current(name, expected)?,
            _ => {
                // Surfaces RefNotFound for refs that never existed.
                self.get(name)?;
            }
        }

        match fs::remove_file(self.loose_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut packed = self.read_packed()?;
        if packed.remove(name).is_some() {
            let packed_lock = RefLock::acquire(self.git_dir.join("packed-refs"), "packed-refs")?;
            let mut content = String::from("# pack-refs with: peeled fully-peeled sorted \n");
            for (ref_name, id) in &packed {
                content.push_str(&format!("{} {}\n", id, ref_name));
            }
            packed_lock.commit(&content)?;
        }
        Ok(())
    }

    /// Lists all references under `refs/` starting with a prefix, sorted by name.
    pub fn list(&self, prefix: &str) -> Result<Vec<(String, Reference)>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .collect())
    }

    /// Lists all references under `refs/`, sorted by name. Loose refs shadow packed ones.
    pub fn list_all(&self) -> Result<Vec<(String, Reference)>> {
        let mut refs: BTreeMap<String, Reference> = self
            .read_packed()?
            .into_iter()
            .map(|(name, id)| (name, Reference::Direct(id)))
            .collect();

        let refs_dir = self.git_dir.join("refs");
        if refs_dir.is_dir() {
            self.walk(&refs_dir, "refs", &mut refs)?;
        }

        Ok(refs.into_iter().collect())
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut BTreeMap<String, Reference>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let name = format!("{}/{}", prefix, file_name);
            if entry.file_type()?.is_dir() {
                self.walk(&entry.path(), &name, out)?;
            } else if !file_name.ends_with(".lock") {
                let content = fs::read_to_string(entry.path())?;
                match Reference::parse(&name, &content) {
                    Ok(reference) => {
                        out.insert(name, reference);
                    }
                    Err(e) => tracing::warn!(reference = %name, error = %e, "Skipping unreadable ref"),
                }
            }
        }
        Ok(())
    }

    fn read_packed(&self) -> Result<BTreeMap<String, ObjectId>> {
        let content = match fs::read_to_string(self.git_dir.join("packed-refs")) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = BTreeMap::new();
        for line in content.lines() {
            if line.starts_with('#') || line.starts_with('^') || line.is_empty() {
                continue;
            }
            if let Some((hex, name)) = line.split_once(' ') {
                refs.insert(name.to_string(), ObjectId::from_hex(hex)?);
            }
        }
        Ok(refs)
    }
}

/// A `<path>.lock` file held while a ref is rewritten. Dropping the lock
/// without committing removes it and leaves the ref untouched.
struct RefLock {
    lock_path: PathBuf,
    target: PathBuf,
    file: Option<File>,
}

impl RefLock {
    fn acquire(target: PathBuf, name: &str) -> Result<Self> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut lock_name = target.as_os_str().to_owned();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::RefLocked(name.to_string()),
                _ => StorageError::Io(e),
            })?;

        Ok(Self {
            lock_path,
            target,
            file: Some(file),
        })
    }

    fn commit(mut self, content: &str) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&self.lock_path, &self.target)?;
        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        // After a successful rename the lock path no longer exists.
        let _ = fs::remove_file(&self.lock_path);
    }
}
