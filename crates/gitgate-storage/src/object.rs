//! The four git object kinds and their canonical encodings.
//!
//! An object's id is the SHA-1 of `"<kind> <len>\0"` followed by its
//! uncompressed body; the same header prefixes the loose file on disk.

use crate::{Result, StorageError};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::fmt;

const ID_LEN: usize = 20;

/// Binary SHA-1 naming one object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; ID_LEN]);

impl ObjectId {
    /// Stands for "no object" as the old or new side of a ref update.
    pub const ZERO: ObjectId = ObjectId([0; ID_LEN]);

    pub fn from_bytes(raw: [u8; ID_LEN]) -> Self {
        ObjectId(raw)
    }

    /// Parses the 40-character lowercase or uppercase hex form.
    pub fn from_hex(text: &str) -> Result<Self> {
        let mut raw = [0; ID_LEN];
        match hex::decode_to_slice(text, &mut raw) {
            Ok(()) => Ok(ObjectId(raw)),
            Err(_) => Err(StorageError::InvalidObject(format!(
                "`{}` is not a 40-digit hex object id",
                text
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Id of a body of the given kind, header included.
    pub fn hash_object(kind: ObjectType, body: &[u8]) -> Self {
        let digest = Sha1::new()
            .chain_update(kind.as_str())
            .chain_update(b" ")
            .chain_update(body.len().to_string())
            .chain_update([0u8])
            .chain_update(body)
            .finalize();
        ObjectId(digest.into())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectId").field(&format_args!("{}", self)).finish()
    }
}

/// Object kinds. Discriminants are the 3-bit codes of a pack entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
}

impl ObjectType {
    const ALL: [ObjectType; 4] = [Self::Commit, Self::Tree, Self::Blob, Self::Tag];

    /// Name written in object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| StorageError::InvalidObject(format!("no object kind named `{}`", name)))
    }

    pub fn pack_type(&self) -> u8 {
        *self as u8
    }

    /// Kind for a pack entry code. Delta codes (6, 7) are not kinds.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.pack_type() == code)
            .ok_or_else(|| {
                StorageError::InvalidObject(format!("pack entry code {} is not an object kind", code))
            })
    }
}

/// An object body together with its kind and id.
#[derive(Debug, Clone)]
pub struct GitObject {
    pub id: ObjectId,
    pub object_type: ObjectType,
    /// Uncompressed body, without the `<kind> <len>\0` header.
    pub data: Bytes,
}

impl GitObject {
    /// Wraps a body and hashes it.
    pub fn new(object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        GitObject {
            id: ObjectId::hash_object(object_type, &data),
            object_type,
            data,
        }
    }

    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectType::Blob, content)
    }

    /// Encodes `entries` as a tree. Callers may pass them in any order;
    /// they are written sorted the way git expects.
    pub fn tree(entries: &[TreeEntry]) -> Self {
        let mut ordered: Vec<&TreeEntry> = entries.iter().collect();
        ordered.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let body = ordered.iter().fold(Vec::new(), |mut body, entry| {
            body.extend_from_slice(format!("{} {}\0", entry.mode, entry.name).as_bytes());
            body.extend_from_slice(entry.id.as_bytes());
            body
        });
        Self::new(ObjectType::Tree, body)
    }

    /// Encodes a commit. `author` and `committer` are full signature
    /// lines: `Name <email> <epoch> <tz>`.
    pub fn commit(
        tree_id: &ObjectId,
        parents: &[ObjectId],
        author: &str,
        committer: &str,
        message: &str,
    ) -> Self {
        use std::fmt::Write;

        let mut body = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(body, "tree {}", tree_id);
        for parent in parents {
            let _ = writeln!(body, "parent {}", parent);
        }
        let _ = write!(body, "author {}\ncommitter {}\n\n{}", author, committer, message);
        Self::new(ObjectType::Commit, body)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Decodes a tree body. Fails for any other kind.
    pub fn tree_entries(&self) -> Result<Vec<TreeEntry>> {
        match self.object_type {
            ObjectType::Tree => TreeEntry::parse_all(&self.data),
            other => Err(StorageError::InvalidObject(format!(
                "expected {} to be a tree, found a {}",
                self.id,
                other.as_str()
            ))),
        }
    }

    /// Ids named by the `tree`, `parent` and `object` headers of a commit
    /// or tag. Stops at the blank line before the message.
    pub fn header_links(&self) -> Vec<ObjectId> {
        self.data
            .split(|&b| b == b'\n')
            .take_while(|line| !line.is_empty())
            .filter_map(|line| {
                let (key, value) = split_once(line, b' ')?;
                match key {
                    b"tree" | b"parent" | b"object" => std::str::from_utf8(value)
                        .ok()
                        .and_then(|hex| ObjectId::from_hex(hex.trim()).ok()),
                    _ => None,
                }
            })
            .collect()
    }
}

/// One `<mode> <name>\0<id>` record of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Octal mode text exactly as stored, e.g. `100644` or `40000`.
    pub mode: String,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: impl Into<String>, name: impl Into<String>, id: ObjectId) -> Self {
        TreeEntry {
            mode: mode.into(),
            name: name.into(),
            id,
        }
    }

    /// Subdirectory entry. Some writers pad the mode to `040000`.
    pub fn is_tree(&self) -> bool {
        matches!(self.mode.as_str(), "40000" | "040000")
    }

    /// Submodule commit pointer.
    pub fn is_gitlink(&self) -> bool {
        self.mode == "160000"
    }

    // Directories compare as though their name ended in '/'.
    fn sort_key(&self) -> Vec<u8> {
        let suffix: &[u8] = if self.is_tree() { b"/" } else { b"" };
        [self.name.as_bytes(), suffix].concat()
    }

    /// Decodes every record of a tree body.
    pub fn parse_all(data: &[u8]) -> Result<Vec<TreeEntry>> {
        let malformed = |what: &str| StorageError::InvalidObject(format!("tree record {}", what));

        let mut rest = data;
        let mut entries = Vec::new();
        while !rest.is_empty() {
            let (mode, after_mode) = split_once(rest, b' ').ok_or_else(|| malformed("has no mode"))?;
            let (name, after_name) =
                split_once(after_mode, 0).ok_or_else(|| malformed("has no name terminator"))?;
            if after_name.len() < ID_LEN {
                return Err(malformed("ends inside its object id"));
            }
            let (raw_id, tail) = after_name.split_at(ID_LEN);

            let mut id = [0; ID_LEN];
            id.copy_from_slice(raw_id);
            entries.push(TreeEntry::new(
                String::from_utf8_lossy(mode),
                String::from_utf8_lossy(name),
                ObjectId(id),
            ));
            rest = tail;
        }
        Ok(entries)
    }
}

fn split_once(bytes: &[u8], delim: u8) -> Option<(&[u8], &[u8])> {
    let at = bytes.iter().position(|&b| b == delim)?;
    Some((&bytes[..at], &bytes[at + 1..]))
}
