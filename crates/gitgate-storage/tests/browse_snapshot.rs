//! Browsing a committed snapshot through a repository directory.
//!
//! Layout used throughout:
//! - README.md
//! - src/main.go

use gitgate_storage::{
    FileTree, FsRepoDirectory, GitObject, ObjectId, RepoDirectory, Repository, TreeEntry,
};
use tempfile::TempDir;

const AUTHOR: &str = "Alice <alice@example.com> 1700000000 +0100";

fn commit_sample(repo: &Repository) -> ObjectId {
    let main = GitObject::blob(b"package main\n".to_vec());
    let readme = GitObject::blob(b"# Sample\n".to_vec());
    let src = GitObject::tree(&[TreeEntry::new("100644", "main.go", main.id)]);
    let root = GitObject::tree(&[
        TreeEntry::new("100644", "README.md", readme.id),
        TreeEntry::new("40000", "src", src.id),
    ]);
    for object in [&main, &readme, &src, &root] {
        repo.objects.put(object).unwrap();
    }
    repo.commit(&root.id, "Initial import\n\nWith a body.\n", AUTHOR, AUTHOR)
        .unwrap()
}

#[test]
fn test_fresh_repository_is_empty_not_missing() {
    let temp = TempDir::new().unwrap();
    let dir = FsRepoDirectory::new(temp.path());
    dir.create("fresh").unwrap();

    let repo = dir.open("fresh").unwrap();
    assert!(repo.latest_commit().unwrap().is_none());
    assert!(repo.head_tree().unwrap().is_none());
}

#[test]
fn test_latest_commit_projection() {
    let temp = TempDir::new().unwrap();
    let dir = FsRepoDirectory::new(temp.path());
    dir.create("project").unwrap();
    let id = commit_sample(&dir.open("project").unwrap());

    let info = dir.open("project").unwrap().latest_commit().unwrap().unwrap();
    assert_eq!(info.id, id);
    assert_eq!(info.summary(), "Initial import");
    assert_eq!(info.author, "Alice");
    assert_eq!(info.date.timestamp(), 1_700_000_000);
    assert_eq!(info.date.offset().local_minus_utc(), 3600);
}

#[test]
fn test_head_tree_resolves_paths() {
    let temp = TempDir::new().unwrap();
    let dir = FsRepoDirectory::new(temp.path());
    dir.create("project").unwrap();
    commit_sample(&dir.open("project").unwrap());

    let tree = dir.open("project").unwrap().head_tree().unwrap().unwrap();

    let root_names: Vec<&str> = tree
        .children(FileTree::ROOT)
        .map(|(_, node)| node.name())
        .collect();
    assert_eq!(root_names, vec!["src", "README.md"]);

    let main = tree.node(tree.resolve("src/main.go"));
    assert!(!main.is_directory());
    assert_eq!(main.data().unwrap().as_ref(), b"package main\n");

    // An unknown segment degrades to the deepest matched directory.
    let fallback = tree.node(tree.resolve("src/missing/deep"));
    assert!(fallback.is_directory());
    assert_eq!(fallback.path(), "src");
}

#[test]
fn test_snapshot_tracks_new_commits() {
    let temp = TempDir::new().unwrap();
    let dir = FsRepoDirectory::new(temp.path());
    dir.create("project").unwrap();
    let repo = dir.open("project").unwrap();
    commit_sample(&repo);

    let notes = GitObject::blob(b"v2\n".to_vec());
    let root = GitObject::tree(&[TreeEntry::new("100644", "NOTES", notes.id)]);
    repo.objects.put(&notes).unwrap();
    repo.objects.put(&root).unwrap();
    repo.commit(&root.id, "Replace everything\n", AUTHOR, AUTHOR)
        .unwrap();

    // A handle opened earlier still reads from disk.
    let tree = repo.head_tree().unwrap().unwrap();
    assert_eq!(tree.children(FileTree::ROOT).count(), 1);
    assert_eq!(tree.node(tree.resolve("NOTES")).name(), "NOTES");
    assert_eq!(
        repo.latest_commit().unwrap().unwrap().parents.len(),
        1
    );
}
