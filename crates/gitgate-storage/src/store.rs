//! Loose object store and repository handles.

use crate::{
    CommitInfo, FileTree, GitObject, ObjectId, ObjectType, RefStore, Reference, Result,
    StorageError,
};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Content-addressed object store over git's loose object layout
/// (`objects/xx/yyyy...`, zlib-compressed `"<type> <size>\0<data>"`).
#[derive(Debug, Clone)]
pub struct ObjectStore {
    dir: PathBuf,
}

impl ObjectStore {
    /// Creates a store rooted at an `objects/` directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the `objects/` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the loose file for an object id.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Stores an object and returns its ID. Existing objects are left untouched.
    pub fn put(&self, object: &GitObject) -> Result<ObjectId> {
        let path = self.object_path(&object.id);
        if path.exists() {
            return Ok(object.id);
        }

        let fan_out = path
            .parent()
            .ok_or_else(|| StorageError::InvalidObject(path.display().to_string()))?;
        fs::create_dir_all(fan_out)?;

        let compressed = Self::compress(object)?;
        let mut tmp = tempfile::NamedTempFile::new_in(fan_out)?;
        tmp.write_all(&compressed)?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        Ok(object.id)
    }

    /// Retrieves an object by ID.
    pub fn get(&self, id: &ObjectId) -> Result<GitObject> {
        let compressed = match fs::read(self.object_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound(id.to_hex()))
            }
            Err(e) => return Err(e.into()),
        };
        let object = Self::decompress(&compressed)?;
        if object.id != *id {
            return Err(StorageError::InvalidObject(format!(
                "object {} hashes to {}",
                id, object.id
            )));
        }
        Ok(object)
    }

    /// Checks if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Lists all loose object IDs.
    pub fn list_objects(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        let fan_outs = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        for fan_out in fan_outs {
            let fan_out = fan_out?;
            let prefix = fan_out.file_name().to_string_lossy().to_string();
            if prefix.len() != 2 || !fan_out.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(fan_out.path())? {
                let rest = entry?.file_name().to_string_lossy().to_string();
                if let Ok(id) = ObjectId::from_hex(&format!("{}{}", prefix, rest)) {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Compresses object data using zlib.
    pub fn compress(object: &GitObject) -> Result<Vec<u8>> {
        let header = format!("{} {}\0", object.object_type.as_str(), object.data.len());
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(header.as_bytes())
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        encoder
            .write_all(&object.data)
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| StorageError::Compression(e.to_string()))
    }

    /// Decompresses object data from zlib.
    pub fn decompress(compressed: &[u8]) -> Result<GitObject> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| StorageError::Compression(e.to_string()))?;

        // Header: "type size\0data"
        let null_pos = decompressed.iter().position(|&b| b == 0).ok_or_else(|| {
            StorageError::InvalidObject("missing null byte in header".to_string())
        })?;

        let header = String::from_utf8_lossy(&decompressed[..null_pos]);
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| StorageError::InvalidObject(format!("invalid header: {}", header)))?;

        let object_type = ObjectType::parse(kind)?;
        let size: usize = size
            .parse()
            .map_err(|_| StorageError::InvalidObject("invalid size".to_string()))?;

        let data = &decompressed[null_pos + 1..];
        if data.len() != size {
            return Err(StorageError::InvalidObject(format!(
                "declared size {} but found {} bytes",
                size,
                data.len()
            )));
        }

        Ok(GitObject::new(object_type, Bytes::copy_from_slice(data)))
    }
}

/// A handle on one repository directory.
///
/// Opening validates the layout and nothing else; refs and objects are read
/// from disk on every call, so a handle observes concurrent pushes.
#[derive(Debug, Clone)]
pub struct Repository {
    /// Repository name (directory name without a `.git` suffix).
    pub name: String,
    /// Directory the repository was opened from.
    pub root: PathBuf,
    /// The git directory (`root` for bare repositories, `root/.git` otherwise).
    pub git_dir: PathBuf,
    /// Object store.
    pub objects: ObjectStore,
    /// Reference store.
    pub refs: RefStore,
}

impl Repository {
    /// Returns true if `dir` has the files git needs to treat it as a git directory.
    pub fn is_git_dir(dir: &Path) -> bool {
        dir.join("HEAD").is_file() && dir.join("objects").is_dir() && dir.join("refs").is_dir()
    }

    /// Opens a bare repository, or a working tree with a `.git` directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let git_dir = if Self::is_git_dir(root) {
            root.to_path_buf()
        } else if Self::is_git_dir(&root.join(".git")) {
            root.join(".git")
        } else {
            return Err(StorageError::RepoNotFound(root.display().to_string()));
        };

        Ok(Self::from_parts(root, git_dir))
    }

    /// Initializes a new bare repository with `HEAD` pointing at `refs/heads/main`.
    pub fn init_bare(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        for dir in ["objects/info", "objects/pack", "refs/heads", "refs/tags", "info"] {
            fs::create_dir_all(root.join(dir))?;
        }
        fs::write(root.join("HEAD"), "ref: refs/heads/main\n")?;
        fs::write(
            root.join("config"),
            "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = true\n",
        )?;
        fs::write(
            root.join("description"),
            "Unnamed repository; edit this file 'description' to name the repository.\n",
        )?;

        tracing::debug!(path = %root.display(), "Initialized bare repository");
        Ok(Self::from_parts(root, root.to_path_buf()))
    }

    fn from_parts(root: &Path, git_dir: PathBuf) -> Self {
        let file_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = file_name
            .strip_suffix(".git")
            .map(str::to_string)
            .unwrap_or(file_name);

        Self {
            name,
            root: root.to_path_buf(),
            objects: ObjectStore::new(git_dir.join("objects")),
            refs: RefStore::new(&git_dir),
            git_dir,
        }
    }

    /// Gets the current HEAD commit, or `None` while the branch is unborn.
    pub fn head(&self) -> Result<Option<ObjectId>> {
        self.refs.resolve_head()
    }

    /// Returns the latest commit on HEAD, or `None` for an empty repository.
    pub fn latest_commit(&self) -> Result<Option<CommitInfo>> {
        match self.head()? {
            Some(id) => {
                let commit = self.objects.get(&id)?;
                CommitInfo::parse(&commit).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Builds the file tree of the HEAD commit, or `None` for an empty repository.
    pub fn head_tree(&self) -> Result<Option<FileTree>> {
        let Some(commit_id) = self.head()? else {
            return Ok(None);
        };
        let commit = self.objects.get(&commit_id)?;
        let tree_id = CommitInfo::parse(&commit)?.tree;
        FileTree::build(&self.objects, &tree_id).map(Some)
    }

    /// Creates a commit on the current branch.
    pub fn commit(
        &self,
        tree_id: &ObjectId,
        message: &str,
        author: &str,
        committer: &str,
    ) -> Result<ObjectId> {
        let parents: Vec<ObjectId> = self.head()?.into_iter().collect();

        let commit = GitObject::commit(tree_id, &parents, author, committer, message);
        let commit_id = self.objects.put(&commit)?;

        let target = match self.refs.get("HEAD")? {
            Reference::Symbolic(branch) => branch,
            Reference::Direct(_) => "HEAD".to_string(),
        };
        self.refs.set(&target, commit_id)?;

        Ok(commit_id)
    }

    /// Regenerates the files dumb HTTP clients read: `info/refs` and
    /// `objects/info/packs`.
    pub fn update_server_info(&self) -> Result<()> {
        let mut info_refs = String::new();
        for (name, reference) in self.refs.list_all()? {
            if let Reference::Direct(id) = reference {
                info_refs.push_str(&format!("{}\t{}\n", id, name));
            }
        }
        fs::create_dir_all(self.git_dir.join("info"))?;
        fs::write(self.info_refs_path(), info_refs)?;

        let mut packs = String::new();
        let pack_dir = self.objects.dir().join("pack");
        if pack_dir.is_dir() {
            let mut names: Vec<String> = fs::read_dir(&pack_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|n| n.ends_with(".pack"))
                .collect();
            names.sort();
            for name in names {
                packs.push_str(&format!("P {}\n", name));
            }
        }
        fs::create_dir_all(self.objects.dir().join("info"))?;
        fs::write(self.info_packs_path(), packs)?;

        Ok(())
    }

    /// Path of the dumb-protocol ref listing.
    pub fn info_refs_path(&self) -> PathBuf {
        self.git_dir.join("info").join("refs")
    }

    /// Path of the dumb-protocol pack listing.
    pub fn info_packs_path(&self) -> PathBuf {
        self.objects.dir().join("info").join("packs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const AUTHOR: &str = "Alice <alice@example.com> 1700000000 +0000";

    #[test]
    fn test_put_get_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = ObjectStore::new(temp.path());

        let blob = GitObject::blob(b"hello\n".to_vec());
        let id = store.put(&blob).unwrap();

        assert!(store.contains(&id));
        assert!(store
            .object_path(&id)
            .ends_with("ce/013625030ba8dba906f756967f9e9ca394464a"));
        let read = store.get(&id).unwrap();
        assert_eq!(read.data.as_ref(), b"hello\n");
        assert_eq!(store.list_objects().unwrap(), vec![id]);
    }

    #[test]
    fn test_get_missing_object() {
        let temp = TempDir::new().unwrap();
        let store = ObjectStore::new(temp.path());
        let result = store.get(&ObjectId::from_bytes([7u8; 20]));
        assert!(matches!(result, Err(StorageError::ObjectNotFound(_))));
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(ObjectStore::decompress(b"not zlib").is_err());
    }

    #[test]
    fn test_open_invalid_root_fails() {
        let temp = TempDir::new().unwrap();
        let result = Repository::open(temp.path());
        assert!(matches!(result, Err(StorageError::RepoNotFound(_))));
    }

    #[test]
    fn test_init_then_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("project.git");
        Repository::init_bare(&path).unwrap();

        let repo = Repository::open(&path).unwrap();
        assert_eq!(repo.name, "project");
        assert_eq!(repo.git_dir, path);
        assert_eq!(repo.head().unwrap(), None);
        assert!(repo.latest_commit().unwrap().is_none());
        assert!(repo.head_tree().unwrap().is_none());
    }

    #[test]
    fn test_open_working_tree() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("checkout");
        Repository::init_bare(work.join(".git")).unwrap();

        let repo = Repository::open(&work).unwrap();
        assert_eq!(repo.name, "checkout");
        assert_eq!(repo.git_dir, work.join(".git"));
    }

    #[test]
    fn test_commit_advances_branch() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("r.git")).unwrap();

        let tree = GitObject::tree(&[]);
        repo.objects.put(&tree).unwrap();
        let first = repo.commit(&tree.id, "first\n", AUTHOR, AUTHOR).unwrap();
        let second = repo.commit(&tree.id, "second\n", AUTHOR, AUTHOR).unwrap();

        assert_eq!(repo.head().unwrap(), Some(second));
        let commit = repo.objects.get(&second).unwrap();
        assert_eq!(commit.header_links(), vec![tree.id, first]);
        assert_eq!(repo.latest_commit().unwrap().unwrap().message, "second\n");
    }

    #[test]
    fn test_update_server_info() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("r.git")).unwrap();
        let tree = GitObject::tree(&[]);
        repo.objects.put(&tree).unwrap();
        let id = repo.commit(&tree.id, "msg\n", AUTHOR, AUTHOR).unwrap();

        repo.update_server_info().unwrap();

        let refs = fs::read_to_string(repo.info_refs_path()).unwrap();
        assert_eq!(refs, format!("{}\trefs/heads/main\n", id));
        assert_eq!(fs::read_to_string(repo.info_packs_path()).unwrap(), "");
    }
}
