//! Version 2 packfiles: `PACK`, version, object count, the entries, then a
//! SHA-1 of everything before it.
//!
//! The builder writes whole objects only. The parser also accepts both
//! delta encodings clients push (`OFS_DELTA` and `REF_DELTA`).

use crate::{GitError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitgate_storage::{GitObject, ObjectId, ObjectStore, ObjectType};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::{Read, Write};

const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const PACK_VERSION: u32 = 2;
/// Header plus trailing checksum.
const MIN_PACK_LEN: usize = 12 + 20;

const OBJ_OFS_DELTA: u8 = 6;
const OBJ_REF_DELTA: u8 = 7;

/// Collects objects and serialises them as one undeltified pack.
#[derive(Default)]
pub struct PackBuilder {
    entries: Vec<GitObject>,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: GitObject) {
        self.entries.push(object);
    }

    /// Loads `id` from `store` and queues it.
    pub fn add_from_store(&mut self, store: &ObjectStore, id: &ObjectId) -> Result<()> {
        let object = store.get(id)?;
        self.add(object);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the header, every queued entry in order, and the trailer.
    pub fn build(self) -> Result<Vec<u8>> {
        let count = u32::try_from(self.entries.len()).map_err(|_| {
            GitError::InvalidPack(format!("{} objects overflow the pack header", self.entries.len()))
        })?;

        let payload: usize = self.entries.iter().map(GitObject::size).sum();
        let mut out = Vec::with_capacity(MIN_PACK_LEN + payload);
        out.extend(
            PACK_SIGNATURE
                .iter()
                .chain(&PACK_VERSION.to_be_bytes())
                .chain(&count.to_be_bytes()),
        );

        for object in &self.entries {
            encode_entry_header(object.object_type.pack_type(), object.size(), &mut out);
            let mut zlib = ZlibEncoder::new(out, Compression::default());
            zlib.write_all(&object.data)?;
            out = zlib.finish()?;
        }

        let trailer = Sha1::digest(&out);
        out.extend_from_slice(&trailer);
        Ok(out)
    }
}

/// Entry header: type in bits 4-6 of the first byte, then the inflated size
/// as little-endian base-128 starting in that byte's low nibble.
fn encode_entry_header(type_code: u8, size: usize, out: &mut Vec<u8>) {
    let mut byte = (type_code << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;
    while rest != 0 {
        out.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(byte);
}

/// An entry whose base was not available when it was read.
struct PendingDelta {
    offset: usize,
    base: ObjectId,
    delta: Vec<u8>,
}

/// Parses a pack file and extracts objects.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Parses every object in the pack, resolving deltas.
    ///
    /// `lookup` supplies `REF_DELTA` bases that are not in the pack itself,
    /// which is how thin packs refer to objects the receiver already has.
    /// Objects are returned in pack order.
    pub fn parse<F>(&mut self, mut lookup: F) -> Result<Vec<GitObject>>
    where
        F: FnMut(&ObjectId) -> Result<Option<GitObject>>,
    {
        let object_count = self.read_header()?;
        let body_end = self.data.len() - 20;

        let mut objects: Vec<Option<GitObject>> = Vec::with_capacity(object_count);
        let mut by_offset: HashMap<usize, usize> = HashMap::new();
        let mut by_id: HashMap<ObjectId, usize> = HashMap::new();
        let mut pending = Vec::new();

        for index in 0..object_count {
            let offset = self.pos;
            by_offset.insert(offset, index);

            let (type_code, size) = self.read_type_and_size(body_end)?;
            match type_code {
                OBJ_OFS_DELTA => {
                    let distance = self.read_ofs_distance(body_end)?;
                    let base_offset = offset.checked_sub(distance).ok_or_else(|| {
                        GitError::InvalidPack(format!("delta base before pack start at {}", offset))
                    })?;
                    let delta = self.inflate(size, body_end)?;
                    let base = by_offset
                        .get(&base_offset)
                        .and_then(|&i| objects[i].as_ref())
                        .ok_or_else(|| {
                            GitError::InvalidPack(format!("missing delta base at {}", base_offset))
                        })?;
                    let object = GitObject::new(base.object_type, apply_delta(&base.data, &delta)?);
                    by_id.insert(object.id, index);
                    objects.push(Some(object));
                }
                OBJ_REF_DELTA => {
                    let base = self.read_id(body_end)?;
                    let delta = self.inflate(size, body_end)?;
                    let resolved = match by_id.get(&base).and_then(|&i| objects[i].as_ref()) {
                        Some(base_object) => Some(base_object.clone()),
                        None => lookup(&base)?,
                    };
                    match resolved {
                        Some(base_object) => {
                            let object = GitObject::new(
                                base_object.object_type,
                                apply_delta(&base_object.data, &delta)?,
                            );
                            by_id.insert(object.id, index);
                            objects.push(Some(object));
                        }
                        None => {
                            pending.push(PendingDelta {
                                offset,
                                base,
                                delta,
                            });
                            objects.push(None);
                        }
                    }
                }
                code => {
                    let object_type = ObjectType::from_pack_type(code)?;
                    let object = GitObject::new(object_type, self.inflate(size, body_end)?);
                    by_id.insert(object.id, index);
                    objects.push(Some(object));
                }
            }
        }

        if self.pos != body_end {
            return Err(GitError::InvalidPack(format!(
                "{} trailing bytes after last object",
                body_end - self.pos
            )));
        }

        // Bases that appear later in the pack than their deltas.
        while !pending.is_empty() {
            let before = pending.len();
            let mut still_pending = Vec::new();
            for entry in pending {
                match by_id.get(&entry.base).and_then(|&i| objects[i].as_ref()) {
                    Some(base) => {
                        let object =
                            GitObject::new(base.object_type, apply_delta(&base.data, &entry.delta)?);
                        let index = by_offset[&entry.offset];
                        by_id.insert(object.id, index);
                        objects[index] = Some(object);
                    }
                    None => still_pending.push(entry),
                }
            }
            if still_pending.len() == before {
                return Err(GitError::ObjectNotFound(format!(
                    "delta base {}",
                    still_pending[0].base
                )));
            }
            pending = still_pending;
        }

        Ok(objects.into_iter().flatten().collect())
    }

    /// Parses the pack and writes every object into `store`.
    pub fn parse_into(&mut self, store: &ObjectStore) -> Result<Vec<ObjectId>> {
        let objects = self.parse(|id| match store.get(id) {
            Ok(object) => Ok(Some(object)),
            Err(gitgate_storage::StorageError::ObjectNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        })?;

        let mut ids = Vec::with_capacity(objects.len());
        for object in &objects {
            ids.push(store.put(object)?);
        }
        Ok(ids)
    }

    /// Validates the fixed header and the trailer. Returns the object count.
    fn read_header(&mut self) -> Result<usize> {
        let data = self.data;
        if data.len() < MIN_PACK_LEN {
            return Err(GitError::InvalidPack(format!(
                "{} bytes cannot hold a pack header and trailer",
                data.len()
            )));
        }
        let word = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);

        if &data[..4] != PACK_SIGNATURE {
            return Err(GitError::InvalidPack("does not start with PACK".to_string()));
        }
        if word(4) != PACK_VERSION {
            return Err(GitError::InvalidPack(format!("version {} is not supported", word(4))));
        }
        let (body, trailer) = data.split_at(data.len() - 20);
        if Sha1::digest(body).as_slice() != trailer {
            return Err(GitError::InvalidPack("trailer is not the SHA-1 of the pack".to_string()));
        }

        self.pos = 12;
        Ok(word(8) as usize)
    }

    fn next_byte(&mut self, end: usize) -> Result<u8> {
        if self.pos >= end {
            return Err(GitError::InvalidPack("unexpected end of pack".to_string()));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_type_and_size(&mut self, end: usize) -> Result<(u8, usize)> {
        let first_byte = self.next_byte(end)?;
        let type_code = (first_byte >> 4) & 0x07;
        let mut size = (first_byte & 0x0F) as usize;
        let mut shift = 4;
        let mut byte = first_byte;
        while byte & 0x80 != 0 {
            byte = self.next_byte(end)?;
            if shift > 57 {
                return Err(GitError::InvalidPack("object size overflow".to_string()));
            }
            size |= ((byte & 0x7F) as usize) << shift;
            shift += 7;
        }
        Ok((type_code, size))
    }

    /// Reads the base distance of an `OFS_DELTA` entry.
    fn read_ofs_distance(&mut self, end: usize) -> Result<usize> {
        let mut byte = self.next_byte(end)?;
        let mut distance = (byte & 0x7F) as usize;
        while byte & 0x80 != 0 {
            byte = self.next_byte(end)?;
            distance = distance
                .checked_add(1)
                .and_then(|d| d.checked_mul(128))
                .ok_or_else(|| GitError::InvalidPack("delta offset overflow".to_string()))?
                | (byte & 0x7F) as usize;
        }
        Ok(distance)
    }

    fn read_id(&mut self, end: usize) -> Result<ObjectId> {
        if self.pos + 20 > end {
            return Err(GitError::InvalidPack("truncated delta base id".to_string()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 20]);
        self.pos += 20;
        Ok(ObjectId::from_bytes(bytes))
    }

    /// Inflates one zlib stream that must expand to exactly `size` bytes.
    fn inflate(&mut self, size: usize, end: usize) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(&self.data[self.pos..end]);
        let mut out = Vec::with_capacity(size.min(1 << 20));
        (&mut decoder)
            .take(size as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| GitError::InvalidPack(format!("decompression failed: {}", e)))?;
        if out.len() != size {
            return Err(GitError::InvalidPack(format!(
                "entry at {} inflates to {} bytes, header says {}",
                self.pos,
                out.len(),
                size
            )));
        }
        self.pos += decoder.total_in() as usize;
        Ok(out)
    }
}

/// Reads a delta header size (little-endian base-128).
fn read_delta_size(delta: &[u8], pos: &mut usize) -> Result<usize> {
    let mut size = 0usize;
    let mut shift = 0;
    loop {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| GitError::InvalidPack("truncated delta header".to_string()))?;
        *pos += 1;
        if shift > 57 {
            return Err(GitError::InvalidPack("delta size overflow".to_string()));
        }
        size |= ((byte & 0x7F) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(size);
        }
    }
}

/// Applies a git delta to `base`.
pub(crate) fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_size = read_delta_size(delta, &mut pos)?;
    if base_size != base.len() {
        return Err(GitError::InvalidPack(format!(
            "delta expects a {} byte base, got {}",
            base_size,
            base.len()
        )));
    }
    let result_size = read_delta_size(delta, &mut pos)?;
    let mut out = Vec::with_capacity(result_size.min(1 << 24));
    let truncated = || GitError::InvalidPack("truncated delta instruction".to_string());

    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;
        if op & 0x80 != 0 {
            let mut offset = 0usize;
            let mut len = 0usize;
            for bit in 0..4 {
                if op & (1 << bit) != 0 {
                    offset |= (*delta.get(pos).ok_or_else(truncated)? as usize) << (8 * bit);
                    pos += 1;
                }
            }
            for bit in 0..3 {
                if op & (0x10 << bit) != 0 {
                    len |= (*delta.get(pos).ok_or_else(truncated)? as usize) << (8 * bit);
                    pos += 1;
                }
            }
            if len == 0 {
                len = 0x10000;
            }
            let chunk = offset
                .checked_add(len)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| GitError::InvalidPack("delta copy out of range".to_string()))?;
            out.extend_from_slice(chunk);
        } else if op != 0 {
            let len = op as usize;
            let chunk = delta.get(pos..pos + len).ok_or_else(truncated)?;
            out.extend_from_slice(chunk);
            pos += len;
        } else {
            return Err(GitError::InvalidPack("reserved delta opcode 0".to_string()));
        }
    }

    if out.len() != result_size {
        return Err(GitError::InvalidPack(format!(
            "delta produced {} bytes, header says {}",
            out.len(),
            result_size
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_lookup(_: &ObjectId) -> Result<Option<GitObject>> {
        Ok(None)
    }

    fn encode_size(mut n: usize, out: &mut Vec<u8>) {
        loop {
            let byte = (n & 0x7F) as u8;
            n >>= 7;
            if n == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Delta that copies `base[..keep]` and appends `tail`.
    fn make_delta(base: &[u8], keep: usize, tail: &[u8]) -> Vec<u8> {
        let mut delta = Vec::new();
        encode_size(base.len(), &mut delta);
        encode_size(keep + tail.len(), &mut delta);
        // copy offset 0, one length byte
        delta.push(0x80 | 0x10);
        delta.push(keep as u8);
        delta.push(tail.len() as u8);
        delta.extend_from_slice(tail);
        delta
    }

    /// Hand-assembles a pack from raw entries and appends the checksum.
    fn assemble(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut pack = b"PACK".to_vec();
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for entry in entries {
            pack.extend_from_slice(entry);
        }
        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);
        pack
    }

    fn entry_header(type_code: u8, size: usize) -> Vec<u8> {
        let mut header = Vec::new();
        encode_entry_header(type_code, size, &mut header);
        header
    }

    #[test]
    fn built_pack_parses_back_in_order() {
        let readme = GitObject::blob(&b"# gitgate\n"[..]);
        let tree = GitObject::tree(&[gitgate_storage::TreeEntry::new("100644", "README.md", readme.id)]);
        let ids = vec![tree.id, readme.id];

        let mut builder = PackBuilder::new();
        assert!(builder.is_empty());
        builder.add(tree);
        builder.add(readme);
        assert_eq!(builder.len(), 2);
        let pack = builder.build().unwrap();

        let objects = PackParser::new(&pack).parse(no_lookup).unwrap();
        let parsed: Vec<ObjectId> = objects.iter().map(|o| o.id).collect();
        assert_eq!(parsed, ids);
        assert_eq!(objects[0].object_type, ObjectType::Tree);
        assert_eq!(objects[1].data.as_ref(), b"# gitgate\n");
    }

    #[test]
    fn entry_header_uses_continuation_bits() {
        assert_eq!(entry_header(3, 15), [0x3f]);
        assert_eq!(entry_header(1, 16), [0x90, 0x01]);
        assert_eq!(entry_header(2, 0x1234), [0xa4, 0xa3, 0x02]);
    }

    #[test]
    fn empty_pack_is_header_and_trailer() {
        let pack = PackBuilder::new().build().unwrap();
        assert_eq!(pack.len(), MIN_PACK_LEN);
        assert!(PackParser::new(&pack).parse(no_lookup).unwrap().is_empty());
    }

    #[test]
    fn parse_into_writes_loose_objects() {
        let temp = TempDir::new().unwrap();
        let store = ObjectStore::new(temp.path());

        let large: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
        let blob = GitObject::blob(large.clone());
        let tree = GitObject::tree(&[gitgate_storage::TreeEntry::new("100644", "f", blob.id)]);

        let mut builder = PackBuilder::new();
        builder.add(blob.clone());
        builder.add(tree.clone());
        let pack = builder.build().unwrap();

        let ids = PackParser::new(&pack).parse_into(&store).unwrap();
        assert_eq!(ids, vec![blob.id, tree.id]);
        assert_eq!(store.get(&blob.id).unwrap().data.as_ref(), large.as_slice());
    }

    #[test]
    fn ofs_delta_resolves_against_earlier_entry() {
        let base = b"hello world".to_vec();
        let delta = make_delta(&base, 6, b"rust");

        let mut first = entry_header(3, base.len());
        first.extend_from_slice(&zlib(&base));
        let first_len = first.len();

        let mut second = vec![(OBJ_OFS_DELTA << 4) | 0x80 | (delta.len() & 0x0F) as u8];
        second.push((delta.len() >> 4) as u8);
        second.push(first_len as u8);
        second.extend_from_slice(&zlib(&delta));

        let pack = assemble(&[first, second]);
        let objects = PackParser::new(&pack).parse(no_lookup).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].object_type, ObjectType::Blob);
        assert_eq!(objects[1].data.as_ref(), b"hello rust");
        assert_eq!(objects[1].id, GitObject::blob(b"hello rust".to_vec()).id);
    }

    #[test]
    fn ref_delta_base_comes_from_lookup() {
        let base = GitObject::blob(b"base content".to_vec());
        let delta = make_delta(&base.data, 4, b"!");

        let mut entry = vec![(OBJ_REF_DELTA << 4) | (delta.len() as u8 & 0x0F)];
        if delta.len() >= 16 {
            entry[0] |= 0x80;
            entry.push((delta.len() >> 4) as u8);
        }
        entry.extend_from_slice(base.id.as_bytes());
        entry.extend_from_slice(&zlib(&delta));
        let pack = assemble(&[entry]);

        let missing = PackParser::new(&pack).parse(no_lookup);
        assert!(matches!(missing, Err(GitError::ObjectNotFound(_))));

        let base_clone = base.clone();
        let objects = PackParser::new(&pack)
            .parse(move |id| Ok((*id == base_clone.id).then(|| base_clone.clone())))
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].data.as_ref(), b"base!");
    }

    #[test]
    fn ref_delta_may_precede_its_base() {
        let base = GitObject::blob(b"later base".to_vec());
        let delta = make_delta(&base.data, 5, b"r");

        let mut delta_entry = vec![(OBJ_REF_DELTA << 4) | (delta.len() as u8 & 0x0F)];
        assert!(delta.len() < 16);
        delta_entry.extend_from_slice(base.id.as_bytes());
        delta_entry.extend_from_slice(&zlib(&delta));

        let mut base_entry = entry_header(3, base.data.len());
        base_entry.extend_from_slice(&zlib(&base.data));

        let pack = assemble(&[delta_entry, base_entry]);
        let objects = PackParser::new(&pack).parse(no_lookup).unwrap();
        let data: Vec<&[u8]> = objects.iter().map(|o| o.data.as_ref()).collect();
        assert_eq!(data, vec![&b"laterr"[..], &b"later base"[..]]);
    }

    #[test]
    fn malformed_deltas_are_rejected() {
        let base = b"abc";
        // wrong base size
        assert!(apply_delta(base, &[4, 1, 1, b'x']).is_err());
        // copy beyond base
        assert!(apply_delta(base, &[3, 5, 0x91, 0, 5]).is_err());
        // reserved opcode
        assert!(apply_delta(base, &[3, 0, 0]).is_err());
        // result size mismatch
        assert!(apply_delta(base, &[3, 9, 1, b'x']).is_err());
        // insert past end
        assert!(apply_delta(base, &[3, 3, 3, b'x']).is_err());
    }

    #[test]
    fn copy_length_zero_means_64k() {
        let base = vec![7u8; 0x10000];
        let mut delta = Vec::new();
        encode_size(base.len(), &mut delta);
        encode_size(base.len(), &mut delta);
        delta.push(0x80);
        assert_eq!(apply_delta(&base, &delta).unwrap(), base);
    }

    #[test]
    fn bad_signature_version_and_length() {
        let mut bad_sig = b"PACX".to_vec();
        bad_sig.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 0]);
        bad_sig.extend_from_slice(&[0u8; 20]);
        assert!(PackParser::new(&bad_sig).parse(no_lookup).is_err());

        let mut bad_version = b"PACK".to_vec();
        bad_version.extend_from_slice(&[0, 0, 0, 99, 0, 0, 0, 0]);
        bad_version.extend_from_slice(&[0u8; 20]);
        assert!(PackParser::new(&bad_version).parse(no_lookup).is_err());

        assert!(PackParser::new(&[0u8; 10]).parse(no_lookup).is_err());
    }

    #[test]
    fn count_larger_than_entries_fails() {
        let mut pack = PackBuilder::new().build().unwrap();
        pack[11] = 1;
        let body_len = pack.len() - 20;
        let checksum = Sha1::digest(&pack[..body_len]);
        pack[body_len..].copy_from_slice(&checksum);
        assert!(PackParser::new(&pack).parse(no_lookup).is_err());
    }

}
