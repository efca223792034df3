//! Snapshot of a commit's file tree for browsing.
//!
//! The whole tree is loaded into memory when built, blob contents included,
//! so the repository can be released as soon as [`FileTree::build`] returns.
//! Nodes live in one arena owned by the [`FileTree`]; parents are referenced
//! by [`NodeId`] rather than by pointer.

use crate::{ObjectId, ObjectStore, ObjectType, Result, StorageError};
use bytes::Bytes;
use std::collections::HashMap;

/// Index of a node inside its [`FileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A file or directory in the snapshot.
#[derive(Debug, Clone)]
pub struct TreeNode {
    name: String,
    path: String,
    parent: Option<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Directory {
        children: Vec<NodeId>,
        by_name: HashMap<String, NodeId>,
    },
    File {
        data: Bytes,
    },
}

impl TreeNode {
    /// Entry name; empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full slash-separated path from the root; empty for the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true for directory nodes.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// File extension without the dot; empty for directories and extensionless files.
    pub fn extension(&self) -> &str {
        if self.is_directory() {
            return "";
        }
        match self.name.rfind('.') {
            Some(0) | None => "",
            Some(pos) => &self.name[pos + 1..],
        }
    }

    /// Raw file content; `None` for directories.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.kind {
            NodeKind::File { data } => Some(data),
            NodeKind::Directory { .. } => None,
        }
    }

    /// Parent node id; `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// An immutable snapshot of a tree object and everything below it.
#[derive(Debug, Clone)]
pub struct FileTree {
    nodes: Vec<TreeNode>,
}

impl FileTree {
    /// Id of the root directory.
    pub const ROOT: NodeId = NodeId(0);

    /// Creates a tree holding only an empty root directory.
    pub fn empty() -> Self {
        Self {
            nodes: vec![TreeNode {
                name: String::new(),
                path: String::new(),
                parent: None,
                kind: NodeKind::Directory {
                    children: Vec::new(),
                    by_name: HashMap::new(),
                },
            }],
        }
    }

    /// Loads the tree object `tree_id` and all of its descendants.
    ///
    /// Within each directory, subdirectories come first, then files, each
    /// group in the tree object's order. Submodule links are skipped since
    /// their commits are not in this object store.
    pub fn build(store: &ObjectStore, tree_id: &ObjectId) -> Result<Self> {
        let mut tree = Self::empty();
        let mut pending = vec![(Self::ROOT, *tree_id)];

        while let Some((dir, id)) = pending.pop() {
            let object = store.get(&id)?;
            let entries = object.tree_entries()?;
            let (subtrees, files): (Vec<_>, Vec<_>) = entries
                .into_iter()
                .filter(|e| !e.is_gitlink())
                .partition(|e| e.is_tree());

            for entry in subtrees {
                let child = tree.add_directory(dir, &entry.name)?;
                pending.push((child, entry.id));
            }
            for entry in files {
                let blob = store.get(&entry.id)?;
                if blob.object_type != ObjectType::Blob {
                    return Err(StorageError::InvalidObject(format!(
                        "tree entry {} points at a {}",
                        entry.name,
                        blob.object_type.as_str()
                    )));
                }
                tree.add_file(dir, &entry.name, blob.data)?;
            }
        }

        Ok(tree)
    }

    /// Adds an empty subdirectory under `parent`.
    pub fn add_directory(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(
            parent,
            name,
            NodeKind::Directory {
                children: Vec::new(),
                by_name: HashMap::new(),
            },
        )
    }

    /// Adds a file under `parent`.
    pub fn add_file(&mut self, parent: NodeId, name: &str, data: impl Into<Bytes>) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::File { data: data.into() })
    }

    fn insert(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(StorageError::InvalidObject(format!(
                "invalid tree entry name {:?}",
                name
            )));
        }

        let id = NodeId(self.nodes.len());
        let parent_node = self.node(parent);
        let path = if parent_node.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_node.path, name)
        };

        match &mut self.nodes[parent.0].kind {
            NodeKind::Directory { children, by_name } => {
                if by_name.contains_key(name) {
                    return Err(StorageError::InvalidObject(format!(
                        "duplicate tree entry {:?}",
                        path
                    )));
                }
                by_name.insert(name.to_string(), id);
                children.push(id);
            }
            NodeKind::File { .. } => {
                return Err(StorageError::InvalidObject(format!(
                    "cannot add {:?} under a file",
                    path
                )))
            }
        }

        self.nodes.push(TreeNode {
            name: name.to_string(),
            path,
            parent: Some(parent),
            kind,
        });
        Ok(id)
    }

    /// Returns the node for an id.
    ///
    /// Ids are only handed out by this tree, so lookups cannot miss.
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    /// The root directory.
    pub fn root(&self) -> &TreeNode {
        self.node(Self::ROOT)
    }

    /// Immediate children of a directory, in insertion order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &TreeNode)> + '_ {
        let children: &[NodeId] = match &self.node(id).kind {
            NodeKind::Directory { children, .. } => children,
            NodeKind::File { .. } => &[],
        };
        children.iter().map(move |&child| (child, self.node(child)))
    }

    /// Looks up an immediate child by exact name.
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        match &self.node(id).kind {
            NodeKind::Directory { by_name, .. } => by_name.get(name).copied(),
            NodeKind::File { .. } => None,
        }
    }

    /// Ancestors of a node, nearest parent first, ending with the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.node(parent).parent;
        }
        ancestors
    }

    /// Resolves a path split on `/` or `\`.
    ///
    /// Empty segments are skipped. When a segment names no child of the
    /// current node, the walk stops there and the deepest node matched so
    /// far is returned: a path one level too deep shows the enclosing
    /// directory instead of failing. Callers that need an exact match must
    /// compare the returned node's path with what they asked for.
    pub fn resolve(&self, path: &str) -> NodeId {
        let mut current = Self::ROOT;
        for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
            match self.child(current, segment) {
                Some(child) => current = child,
                None => break,
            }
        }
        current
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when the tree holds nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: children stay unique by name whatever is inserted.
        #[test]
        fn prop_children_unique(names in prop::collection::vec("[a-c]{1,2}", 0..30)) {
            let mut tree = FileTree::empty();
            for name in &names {
                let _ = tree.add_file(FileTree::ROOT, name, Vec::<u8>::new());
            }
            let mut seen = std::collections::HashSet::new();
            for (_, node) in tree.children(FileTree::ROOT) {
                prop_assert!(seen.insert(node.name().to_string()));
            }
            let distinct: std::collections::HashSet<_> = names.iter().collect();
            prop_assert_eq!(seen.len(), distinct.len());
        }

        /// Property: a resolved known path reports the joined segments as its path.
        #[test]
        fn prop_resolved_path_matches(segments in prop::collection::vec("[a-z]{1,6}", 1..6)) {
            let mut tree = FileTree::empty();
            let mut current = FileTree::ROOT;
            for segment in &segments {
                current = tree.add_directory(current, segment).unwrap();
            }
            let joined = segments.join("/");
            prop_assert_eq!(tree.node(tree.resolve(&joined)).path(), joined.as_str());
        }
    }
}
