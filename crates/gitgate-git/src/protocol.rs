//! Git smart HTTP protocol implementation.
//!
//! Implements the stateless-RPC side of `upload-pack` and `receive-pack`
//! (protocol v0). See: https://git-scm.com/docs/http-protocol

use crate::pack::{PackBuilder, PackParser};
use crate::pktline::{PktLine, PktLineReader, PktLineWriter, MAX_PAYLOAD_LEN};
use crate::{GitError, Result, Service};
use gitgate_storage::{ObjectId, ObjectStore, ObjectType, Reference, Repository};
use std::collections::HashSet;
use std::io::{Read, Write};

/// Side-band channel carrying pack or report data.
const SIDEBAND_DATA: u8 = 1;
/// Largest side-band payload (one byte goes to the channel number).
const SIDEBAND_CHUNK: usize = MAX_PAYLOAD_LEN - 1;

fn capabilities(service: Service, repo: &Repository, agent: &str) -> Result<String> {
    Ok(match service {
        Service::UploadPack => {
            let mut caps = String::from("side-band-64k no-progress");
            if let Some(target) = repo.refs.head_target()? {
                if repo.refs.resolve(&target)?.is_some() {
                    caps.push_str(&format!(" symref=HEAD:{}", target));
                }
            }
            caps.push_str(&format!(" agent={}", agent));
            caps
        }
        Service::ReceivePack => format!(
            "report-status delete-refs side-band-64k quiet no-thin agent={}",
            agent
        ),
    })
}

/// A reference advertisement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefAdvertisement {
    /// Object ID the ref points to.
    pub id: ObjectId,
    /// Reference name.
    pub name: String,
}

impl RefAdvertisement {
    /// Lists what a repository advertises: `HEAD` when it resolves, then
    /// every direct ref under `refs/` in name order.
    pub fn collect(repo: &Repository) -> Result<Vec<Self>> {
        let mut refs = Vec::new();
        if let Some(id) = repo.refs.resolve_head()? {
            refs.push(Self {
                id,
                name: "HEAD".to_string(),
            });
        }
        for (name, reference) in repo.refs.list_all()? {
            if let Reference::Direct(id) = reference {
                refs.push(Self { id, name });
            }
        }
        Ok(refs)
    }
}

/// Writes the ref advertisement for `service`.
///
/// Only the ref lines and their closing flush are written; the
/// `# service=` preamble of the HTTP transport belongs to the caller.
pub fn advertise_refs<W: Write + ?Sized>(
    writer: &mut W,
    repo: &Repository,
    service: Service,
    agent: &str,
) -> Result<()> {
    let mut pkt_writer = PktLineWriter::new(writer);
    let caps = capabilities(service, repo, agent)?;
    let refs = RefAdvertisement::collect(repo)?;

    match refs.split_first() {
        Some((first, rest)) => {
            pkt_writer.write_fmt(format_args!("{} {}\0{}\n", first.id, first.name, caps))?;
            for adv in rest {
                pkt_writer.write_fmt(format_args!("{} {}\n", adv.id, adv.name))?;
            }
        }
        None => {
            pkt_writer.write_fmt(format_args!("{} capabilities^{{}}\0{}\n", ObjectId::ZERO, caps))?;
        }
    }

    pkt_writer.flush_pkt()?;
    pkt_writer.flush()?;
    Ok(())
}

/// Want/have negotiation sent by a fetching client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Object IDs the client wants.
    pub wants: Vec<ObjectId>,
    /// Object IDs the client already has.
    pub haves: Vec<ObjectId>,
    /// Capabilities from the first want line.
    pub capabilities: Vec<String>,
    /// Whether the client ended negotiation with `done`.
    pub done: bool,
}

impl UploadRequest {
    /// Parses want/have lines from the client.
    pub fn parse<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut pkt_reader = PktLineReader::new(reader);
        let mut request = Self::default();

        loop {
            match pkt_reader.read()? {
                Some(PktLine::Data(data)) => {
                    let line = String::from_utf8_lossy(&data);
                    let mut words = line.split_whitespace();
                    match words.next() {
                        Some("want") => {
                            request.wants.push(parse_id(words.next(), &line)?);
                            if request.wants.len() == 1 {
                                request.capabilities = words.map(str::to_string).collect();
                            }
                        }
                        Some("have") => request.haves.push(parse_id(words.next(), &line)?),
                        Some("done") => {
                            request.done = true;
                            break;
                        }
                        // shallow/deepen/filter are never advertised
                        _ => {}
                    }
                }
                Some(_) => continue,
                None => break,
            }
        }

        Ok(request)
    }

    /// Returns true if the client asked for `capability`.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

fn parse_id(word: Option<&str>, line: &str) -> Result<ObjectId> {
    let hex = word.ok_or_else(|| GitError::Protocol(format!("missing object id in {:?}", line)))?;
    ObjectId::from_hex(hex).map_err(|_| GitError::Protocol(format!("bad object id in {:?}", line)))
}

/// Handles git-upload-pack (fetch/clone).
///
/// There is no common-ancestor negotiation: every reply is `NAK`. Until the
/// client sends `done` the reply is only that `NAK`; after it, the pack of
/// everything reachable from the wants and not from the haves follows.
pub fn upload_pack<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    repo: &Repository,
) -> Result<()> {
    let request = UploadRequest::parse(reader)?;
    let mut pkt_writer = PktLineWriter::new(writer);

    if request.wants.is_empty() {
        pkt_writer.flush()?;
        return Ok(());
    }
    for want in &request.wants {
        if !repo.objects.contains(want) {
            return Err(GitError::Protocol(format!("not our ref {}", want)));
        }
    }

    pkt_writer.write_line("NAK")?;
    if !request.done {
        pkt_writer.flush()?;
        return Ok(());
    }

    let known: Vec<ObjectId> = request
        .haves
        .iter()
        .copied()
        .filter(|id| repo.objects.contains(id))
        .collect();
    let excluded = reachable(&repo.objects, &known, &HashSet::new())?;
    let ids = reachable_ordered(&repo.objects, &request.wants, &excluded)?;

    let mut builder = PackBuilder::new();
    for id in &ids {
        builder.add_from_store(&repo.objects, id)?;
    }
    let pack = builder.build()?;
    tracing::debug!(
        repo = %repo.name,
        objects = ids.len(),
        bytes = pack.len(),
        "Sending pack"
    );

    if request.has_capability("side-band-64k") || request.has_capability("side-band") {
        let chunk_size = if request.has_capability("side-band-64k") {
            SIDEBAND_CHUNK
        } else {
            999
        };
        for chunk in pack.chunks(chunk_size) {
            pkt_writer.write_sideband(SIDEBAND_DATA, chunk)?;
        }
        pkt_writer.flush_pkt()?;
    } else {
        pkt_writer.inner_mut().write_all(&pack)?;
    }

    pkt_writer.flush()?;
    Ok(())
}

/// Ids linked from an object: tree and parents of a commit, entries of a
/// tree, the target of a tag.
fn links(store: &ObjectStore, id: &ObjectId) -> Result<Vec<ObjectId>> {
    let object = store.get(id)?;
    Ok(match object.object_type {
        ObjectType::Commit | ObjectType::Tag => object.header_links(),
        ObjectType::Tree => object
            .tree_entries()?
            .into_iter()
            .filter(|e| !e.is_gitlink())
            .map(|e| e.id)
            .collect(),
        ObjectType::Blob => Vec::new(),
    })
}

fn reachable(
    store: &ObjectStore,
    roots: &[ObjectId],
    excluded: &HashSet<ObjectId>,
) -> Result<HashSet<ObjectId>> {
    Ok(reachable_ordered(store, roots, excluded)?.into_iter().collect())
}

/// Depth-first walk from `roots`, skipping anything in `excluded`.
fn reachable_ordered(
    store: &ObjectStore,
    roots: &[ObjectId],
    excluded: &HashSet<ObjectId>,
) -> Result<Vec<ObjectId>> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<ObjectId> = roots.iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        if excluded.contains(&id) || !seen.insert(id) {
            continue;
        }
        order.push(id);
        let mut next = links(store, &id)?;
        next.reverse();
        stack.extend(next);
    }
    Ok(order)
}

/// A ref update command from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Old object ID (zeros for create).
    pub old_id: ObjectId,
    /// New object ID (zeros for delete).
    pub new_id: ObjectId,
    /// Reference name.
    pub ref_name: String,
}

impl Command {
    /// Checks if this is a create command.
    pub fn is_create(&self) -> bool {
        self.old_id.is_zero()
    }

    /// Checks if this is a delete command.
    pub fn is_delete(&self) -> bool {
        self.new_id.is_zero()
    }

    /// Parses `<old> <new> <ref>` with capabilities already stripped.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.trim_end_matches('\n').splitn(3, ' ');
        let (Some(old), Some(new), Some(ref_name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(GitError::Protocol(format!("malformed command {:?}", line)));
        };
        Ok(Self {
            old_id: parse_id(Some(old), line)?,
            new_id: parse_id(Some(new), line)?,
            ref_name: ref_name.to_string(),
        })
    }
}

/// Outcome of one ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// The command as sent.
    pub command: Command,
    /// `Err` carries the reason reported to the client.
    pub result: std::result::Result<(), String>,
}

/// Handles git-receive-pack (push).
///
/// Each ref moves with a compare-and-swap against the old id the client
/// saw, so concurrent pushes to the same ref cannot both win. Failed
/// updates are reported per ref; they do not fail the request.
pub fn receive_pack<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    repo: &Repository,
) -> Result<Vec<CommandStatus>> {
    let mut pkt_reader = PktLineReader::new(reader);
    let mut commands = Vec::new();
    let mut caps: Vec<String> = Vec::new();

    loop {
        match pkt_reader.read()? {
            Some(PktLine::Data(data)) => {
                let line = String::from_utf8_lossy(&data);
                let line = match line.split_once('\0') {
                    Some((command, rest)) => {
                        if commands.is_empty() {
                            caps = rest.split_whitespace().map(str::to_string).collect();
                        }
                        command.to_string()
                    }
                    None => line.to_string(),
                };
                commands.push(Command::parse(&line)?);
            }
            Some(PktLine::Flush) | None => break,
            Some(_) => continue,
        }
    }

    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let mut pack_data = Vec::new();
    pkt_reader.inner_mut().read_to_end(&mut pack_data)?;

    let unpack = if pack_data.is_empty() {
        Ok(())
    } else {
        PackParser::new(&pack_data)
            .parse_into(&repo.objects)
            .map(|ids| {
                tracing::debug!(repo = %repo.name, objects = ids.len(), "Unpacked objects");
            })
            .map_err(|e| e.to_string())
    };

    let statuses: Vec<CommandStatus> = commands
        .into_iter()
        .map(|command| {
            let result = match &unpack {
                Ok(()) => apply_command(repo, &command),
                Err(_) => Err("unpacker error".to_string()),
            };
            match &result {
                Ok(()) => tracing::info!(
                    repo = %repo.name,
                    ref_name = %command.ref_name,
                    old = %command.old_id,
                    new = %command.new_id,
                    "Updated ref"
                ),
                Err(reason) => tracing::warn!(
                    repo = %repo.name,
                    ref_name = %command.ref_name,
                    reason = %reason,
                    "Rejected ref update"
                ),
            }
            CommandStatus { command, result }
        })
        .collect();

    if statuses.iter().any(|s| s.result.is_ok()) {
        repo.update_server_info()?;
    }

    let has_cap = |name: &str| caps.iter().any(|c| c == name);
    if has_cap("report-status") {
        let mut report = Vec::new();
        {
            let mut report_writer = PktLineWriter::new(&mut report);
            match &unpack {
                Ok(()) => report_writer.write_line("unpack ok")?,
                Err(reason) => report_writer.write_fmt(format_args!("unpack {}\n", reason))?,
            }
            for status in &statuses {
                match &status.result {
                    Ok(()) => report_writer
                        .write_fmt(format_args!("ok {}\n", status.command.ref_name))?,
                    Err(reason) => report_writer.write_fmt(format_args!(
                        "ng {} {}\n",
                        status.command.ref_name, reason
                    ))?,
                }
            }
            report_writer.flush_pkt()?;
        }

        let mut pkt_writer = PktLineWriter::new(writer);
        if has_cap("side-band-64k") {
            for chunk in report.chunks(SIDEBAND_CHUNK) {
                pkt_writer.write_sideband(SIDEBAND_DATA, chunk)?;
            }
            pkt_writer.flush_pkt()?;
        } else {
            pkt_writer.inner_mut().write_all(&report)?;
        }
        pkt_writer.flush()?;
    }

    Ok(statuses)
}

fn apply_command(repo: &Repository, command: &Command) -> std::result::Result<(), String> {
    if command.is_delete() {
        return repo
            .refs
            .delete(&command.ref_name, Some(command.old_id))
            .map_err(|e| e.to_string());
    }
    if !command.ref_name.starts_with("refs/") {
        return Err("funny refname".to_string());
    }
    if !repo.objects.contains(&command.new_id) {
        return Err("missing necessary objects".to_string());
    }
    repo.refs
        .compare_and_swap(&command.ref_name, command.old_id, command.new_id)
        .map_err(|e| match e {
            gitgate_storage::StorageError::RefLocked(_) => "failed to lock".to_string(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitgate_storage::{GitObject, TreeEntry};
    use std::io::Cursor;
    use tempfile::TempDir;

    const AUTHOR: &str = "Alice <alice@example.com> 1700000000 +0000";

    fn repo_with_commit() -> (TempDir, Repository, ObjectId) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("r.git")).unwrap();
        let blob = GitObject::blob(b"content\n".to_vec());
        let tree = GitObject::tree(&[TreeEntry::new("100644", "file.txt", blob.id)]);
        repo.objects.put(&blob).unwrap();
        repo.objects.put(&tree).unwrap();
        let commit = repo.commit(&tree.id, "init\n", AUTHOR, AUTHOR).unwrap();
        (temp, repo, commit)
    }

    fn read_lines(data: &[u8]) -> Vec<PktLine> {
        let mut reader = PktLineReader::new(Cursor::new(data.to_vec()));
        let mut packets = Vec::new();
        while let Some(pkt) = reader.read().unwrap() {
            packets.push(pkt);
        }
        packets
    }

    #[test]
    fn test_ref_advertisement() {
        let (_temp, repo, commit) = repo_with_commit();

        let mut output = Vec::new();
        advertise_refs(&mut output, &repo, Service::UploadPack, "gitgate/test").unwrap();

        let packets = read_lines(&output);
        assert_eq!(packets.len(), 3);
        let first = packets[0].as_str().unwrap();
        assert!(first.starts_with(&format!("{} HEAD\0", commit)));
        assert!(first.contains("symref=HEAD:refs/heads/main"));
        assert!(first.ends_with("agent=gitgate/test"));
        assert_eq!(
            packets[1].as_str().unwrap(),
            format!("{} refs/heads/main", commit)
        );
        assert!(packets[2].is_flush());
    }

    #[test]
    fn test_empty_repo_advertises_capabilities_line() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init_bare(temp.path().join("e.git")).unwrap();

        let mut output = Vec::new();
        advertise_refs(&mut output, &repo, Service::ReceivePack, "gitgate/test").unwrap();

        let packets = read_lines(&output);
        let first = packets[0].as_str().unwrap();
        assert!(first.starts_with(&format!("{} capabilities^{{}}\0report-status", ObjectId::ZERO)));
        assert!(!first.contains("symref"));
        assert!(packets[1].is_flush());
    }

    #[test]
    fn test_upload_request_parse() {
        let id = ObjectId::from_bytes([1u8; 20]);
        let have = ObjectId::from_bytes([2u8; 20]);
        let mut input = Vec::new();
        {
            let mut w = PktLineWriter::new(&mut input);
            w.write_line(&format!("want {} side-band-64k ofs-delta", id)).unwrap();
            w.write_line(&format!("want {}", have)).unwrap();
            w.flush_pkt().unwrap();
            w.write_line(&format!("have {}", have)).unwrap();
            w.write_line("done").unwrap();
        }

        let request = UploadRequest::parse(&mut Cursor::new(input)).unwrap();
        assert_eq!(request.wants, vec![id, have]);
        assert_eq!(request.haves, vec![have]);
        assert!(request.done);
        assert!(request.has_capability("side-band-64k"));
        assert!(!request.has_capability("no-progress"));
    }

    #[test]
    fn test_upload_without_done_only_naks() {
        let (_temp, repo, commit) = repo_with_commit();
        let mut input = Vec::new();
        {
            let mut w = PktLineWriter::new(&mut input);
            w.write_line(&format!("want {}", commit)).unwrap();
            w.flush_pkt().unwrap();
        }

        let mut output = Vec::new();
        upload_pack(&mut Cursor::new(input), &mut output, &repo).unwrap();
        assert_eq!(output, b"0008NAK\n");
    }

    #[test]
    fn test_upload_unknown_want_fails() {
        let (_temp, repo, _) = repo_with_commit();
        let mut input = Vec::new();
        {
            let mut w = PktLineWriter::new(&mut input);
            w.write_line(&format!("want {}", ObjectId::from_bytes([9u8; 20]))).unwrap();
            w.flush_pkt().unwrap();
            w.write_line("done").unwrap();
        }
        let result = upload_pack(&mut Cursor::new(input), &mut Vec::new(), &repo);
        assert!(matches!(result, Err(GitError::Protocol(_))));
    }

    #[test]
    fn test_upload_excludes_haves() {
        let (_temp, repo, first) = repo_with_commit();
        let blob = GitObject::blob(b"second\n".to_vec());
        let tree = GitObject::tree(&[TreeEntry::new("100644", "file.txt", blob.id)]);
        repo.objects.put(&blob).unwrap();
        repo.objects.put(&tree).unwrap();
        let second = repo.commit(&tree.id, "second\n", AUTHOR, AUTHOR).unwrap();

        let excluded = reachable(&repo.objects, &[first], &HashSet::new()).unwrap();
        let ids = reachable_ordered(&repo.objects, &[second], &excluded).unwrap();
        assert_eq!(ids, vec![second, tree.id, blob.id]);
    }

    #[test]
    fn test_receive_command_parse() {
        let line = format!("{} {} refs/heads/main", ObjectId::ZERO, ObjectId::from_bytes([1; 20]));
        let command = Command::parse(&line).unwrap();
        assert!(command.is_create());
        assert!(!command.is_delete());
        assert_eq!(command.ref_name, "refs/heads/main");
        assert!(Command::parse("garbage").is_err());
    }
}
