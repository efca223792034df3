//! Push then fetch through the built-in engine, the way a git client drives it.
//!
//! 1. Client pushes a commit with its tree and blob into an empty repository
//! 2. A second client clones and receives every object
//! 3. An incremental fetch only receives what is new

use gitgate_git::{
    LooseObjectEngine, ObjectEngine, PackBuilder, PackParser, PktLine, PktLineReader,
    PktLineWriter, Service,
};
use gitgate_storage::{GitObject, ObjectId, Repository, TreeEntry};
use std::io::Cursor;
use tempfile::TempDir;

const AUTHOR: &str = "Alice <alice@example.com> 1700000000 +0000";

fn snapshot(content: &[u8], parents: &[ObjectId]) -> Vec<GitObject> {
    let blob = GitObject::blob(content.to_vec());
    let tree = GitObject::tree(&[TreeEntry::new("100644", "README.md", blob.id)]);
    let commit = GitObject::commit(&tree.id, parents, AUTHOR, AUTHOR, "update\n");
    vec![commit, tree, blob]
}

fn push(engine: &LooseObjectEngine, repo: &Repository, objects: &[GitObject], old: ObjectId) -> String {
    let new = objects[0].id;
    let mut builder = PackBuilder::new();
    for object in objects {
        builder.add(object.clone());
    }
    let pack = builder.build().unwrap();

    let mut request = Vec::new();
    {
        let mut w = PktLineWriter::new(&mut request);
        w.write_fmt(format_args!(
            "{} {} refs/heads/main\0report-status side-band-64k\n",
            old, new
        ))
        .unwrap();
        w.flush_pkt().unwrap();
    }
    request.extend_from_slice(&pack);

    let mut response = Vec::new();
    engine
        .receive(repo, &mut Cursor::new(request), &mut response)
        .unwrap();

    // Unwrap side-band channel 1, then read the inner report.
    let mut inner = Vec::new();
    let mut reader = PktLineReader::new(Cursor::new(response));
    while let Some(PktLine::Data(data)) = reader.read().unwrap() {
        assert_eq!(data[0], 1);
        inner.extend_from_slice(&data[1..]);
    }
    let mut report = String::new();
    let mut reader = PktLineReader::new(Cursor::new(inner));
    while let Some(PktLine::Data(line)) = reader.read().unwrap() {
        report.push_str(&String::from_utf8_lossy(&line));
    }
    report
}

fn fetch(engine: &LooseObjectEngine, repo: &Repository, want: ObjectId, haves: &[ObjectId]) -> Vec<GitObject> {
    let mut request = Vec::new();
    {
        let mut w = PktLineWriter::new(&mut request);
        w.write_line(&format!("want {} side-band-64k no-progress", want))
            .unwrap();
        w.flush_pkt().unwrap();
        for have in haves {
            w.write_line(&format!("have {}", have)).unwrap();
        }
        w.write_line("done").unwrap();
    }

    let mut response = Vec::new();
    engine
        .upload(repo, &mut Cursor::new(request), &mut response)
        .unwrap();

    let mut reader = PktLineReader::new(Cursor::new(response));
    assert_eq!(reader.read().unwrap().unwrap().as_str(), Some("NAK"));
    let mut pack = Vec::new();
    while let Some(PktLine::Data(data)) = reader.read().unwrap() {
        assert_eq!(data[0], 1);
        pack.extend_from_slice(&data[1..]);
    }
    PackParser::new(&pack).parse(|_| Ok(None)).unwrap()
}

#[test]
fn test_push_then_clone() {
    let temp = TempDir::new().unwrap();
    let repo = Repository::init_bare(temp.path().join("shared.git")).unwrap();
    let engine = LooseObjectEngine::new("test");

    let first = snapshot(b"# Hello\n", &[]);
    let report = push(&engine, &repo, &first, ObjectId::ZERO);
    assert_eq!(report, "unpack ok\nok refs/heads/main\n");
    assert_eq!(repo.head().unwrap(), Some(first[0].id));

    // Dumb-protocol listing follows the push.
    let info_refs = std::fs::read_to_string(repo.info_refs_path()).unwrap();
    assert_eq!(info_refs, format!("{}\trefs/heads/main\n", first[0].id));

    let cloned = fetch(&engine, &repo, first[0].id, &[]);
    let mut ids: Vec<ObjectId> = cloned.iter().map(|o| o.id).collect();
    let mut expected: Vec<ObjectId> = first.iter().map(|o| o.id).collect();
    ids.sort();
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn test_incremental_fetch_and_stale_push() {
    let temp = TempDir::new().unwrap();
    let repo = Repository::init_bare(temp.path().join("shared.git")).unwrap();
    let engine = LooseObjectEngine::new("test");

    let first = snapshot(b"v1\n", &[]);
    push(&engine, &repo, &first, ObjectId::ZERO);
    let second = snapshot(b"v2\n", &[first[0].id]);
    let report = push(&engine, &repo, &second, first[0].id);
    assert!(report.contains("ok refs/heads/main"));

    let fetched = fetch(&engine, &repo, second[0].id, &[first[0].id]);
    assert_eq!(fetched.len(), 3);
    assert!(fetched.iter().all(|o| o.id != first[0].id));

    // A client that still believes main is at the first commit loses.
    let third = snapshot(b"v3\n", &[first[0].id]);
    let report = push(&engine, &repo, &third, first[0].id);
    assert!(report.starts_with("unpack ok\nng refs/heads/main"));
    assert_eq!(repo.head().unwrap(), Some(second[0].id));
}

#[test]
fn test_advertise_after_push() {
    let temp = TempDir::new().unwrap();
    let repo = Repository::init_bare(temp.path().join("shared.git")).unwrap();
    let engine = LooseObjectEngine::new("1.2.3");
    let first = snapshot(b"x\n", &[]);
    push(&engine, &repo, &first, ObjectId::ZERO);

    let mut output = Vec::new();
    engine
        .advertise(&repo, Service::ReceivePack, &mut output)
        .unwrap();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains(&format!("{} HEAD\0report-status", first[0].id)));
    assert!(text.contains("agent=gitgate/1.2.3"));
    assert!(text.ends_with("0000"));
}
