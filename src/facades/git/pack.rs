//! Packfile parsing: the wire format `git-upload-pack` returns a shallow
//! clone's objects in. Supports the two object encodings a clone's pack
//! actually contains — undeltified objects and `OFS_DELTA`/`REF_DELTA`
//! entries against an object already unpacked earlier in the same pack,
//! which is all a shallow, single-branch fetch ever produces (a full
//! repack's `REF_DELTA` against an object from a *different* pack doesn't
//! arise here).

use std::collections::HashMap;
use std::io::Read;

use flate2::bufread::ZlibDecoder;
use sha1::{Digest, Sha1};

use super::objects::ObjectKind;
use super::repo::GitError;

#[derive(Debug, Clone)]
pub struct PackObject {
    pub kind: ObjectKind,
    pub content: Vec<u8>,
}

const OBJ_COMMIT: u8 = 1;
const OBJ_TREE: u8 = 2;
const OBJ_BLOB: u8 = 3;
const OBJ_TAG: u8 = 4;
const OBJ_OFS_DELTA: u8 = 6;
const OBJ_REF_DELTA: u8 = 7;

/// Parse a raw packfile (the `PACK` blob extracted from the
/// `git-upload-pack` response, after pkt-line framing has been stripped)
/// into oid -> object, keyed by the SHA-1 each object hashes to.
pub fn parse_pack(data: &[u8]) -> Result<HashMap<String, PackObject>, GitError> {
    if data.len() < 12 || &data[0..4] != b"PACK" {
        return Err(GitError::PackParse("missing PACK signature".to_string()));
    }
    let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
    let mut cursor = 12usize;
    // Entries keyed by their byte offset in the pack, needed to resolve
    // OFS_DELTA bases, plus the oid index built up as objects are hashed.
    let mut by_offset: HashMap<usize, PackObject> = HashMap::new();
    let mut by_oid: HashMap<String, PackObject> = HashMap::new();
    let mut pending_ofs: Vec<(usize, usize, Vec<u8>)> = Vec::new();
    let mut pending_ref: Vec<(usize, String, Vec<u8>)> = Vec::new();

    for _ in 0..num_objects {
        let start_offset = cursor;
        let (obj_type, inflated_size, mut pos) = read_entry_header(data, cursor)?;
        let _ = inflated_size;

        match obj_type {
            OBJ_COMMIT | OBJ_TREE | OBJ_BLOB | OBJ_TAG => {
                let kind = match obj_type {
                    OBJ_COMMIT => ObjectKind::Commit,
                    OBJ_TREE => ObjectKind::Tree,
                    _ => ObjectKind::Blob,
                };
                let (content, consumed) = inflate_at(data, pos)?;
                pos += consumed;
                let oid = hash_raw(kind, &content);
                let obj = PackObject { kind, content };
                by_offset.insert(start_offset, obj.clone());
                by_oid.insert(oid, obj);
                cursor = pos;
            }
            OBJ_OFS_DELTA => {
                let (back_distance, mut delta_pos) = read_offset_delta(data, pos)?;
                let base_offset = start_offset
                    .checked_sub(back_distance)
                    .ok_or_else(|| GitError::PackParse("ofs-delta underflow".to_string()))?;
                let (delta_bytes, consumed) = inflate_at(data, delta_pos)?;
                delta_pos += consumed;
                pending_ofs.push((start_offset, base_offset, delta_bytes));
                cursor = delta_pos;
            }
            OBJ_REF_DELTA => {
                let base_oid = hex::encode(&data[pos..pos + 20]);
                pos += 20;
                let (delta_bytes, consumed) = inflate_at(data, pos)?;
                pos += consumed;
                pending_ref.push((start_offset, base_oid, delta_bytes));
                cursor = pos;
            }
            other => return Err(GitError::PackParse(format!("unsupported object type {other}"))),
        }
    }

    // Deltas can chain (a delta's base can itself be another unresolved
    // delta), so resolve in a fixed-point loop over both queues together
    // rather than assuming pack order already puts bases first.
    let mut ofs_queue = pending_ofs;
    let mut ref_queue = pending_ref;
    let mut changed = true;
    while changed {
        changed = false;
        ofs_queue.retain(|(off, base_off, delta)| {
            if let Some(base) = by_offset.get(base_off).cloned() {
                let content = apply_delta(&base.content, delta);
                let oid = hash_raw(base.kind, &content);
                let obj = PackObject { kind: base.kind, content };
                by_offset.insert(*off, obj.clone());
                by_oid.insert(oid, obj);
                changed = true;
                false
            } else {
                true
            }
        });
        ref_queue.retain(|(off, base_oid, delta)| {
            if let Some(base) = by_oid.get(base_oid).cloned() {
                let content = apply_delta(&base.content, delta);
                let oid = hash_raw(base.kind, &content);
                let obj = PackObject { kind: base.kind, content };
                by_offset.insert(*off, obj.clone());
                by_oid.insert(oid, obj);
                changed = true;
                false
            } else {
                true
            }
        });
    }
    if !ofs_queue.is_empty() || !ref_queue.is_empty() {
        return Err(GitError::PackParse(format!(
            "{} delta object(s) never resolved to a base",
            ofs_queue.len() + ref_queue.len()
        )));
    }

    Ok(by_oid)
}

fn hash_raw(kind: ObjectKind, content: &[u8]) -> String {
    super::objects::hash_object(kind, content)
}

/// Read a pack entry header: a variable-length, MSB-continuation encoded
/// (type, size) pair. Returns (type, size, next_offset).
fn read_entry_header(data: &[u8], mut pos: usize) -> Result<(u8, u64, usize), GitError> {
    let first = *data.get(pos).ok_or_else(|| GitError::PackParse("truncated pack".to_string()))?;
    pos += 1;
    let obj_type = (first >> 4) & 0x7;
    let mut size = (first & 0x0f) as u64;
    let mut shift = 4;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = *data.get(pos).ok_or_else(|| GitError::PackParse("truncated pack".to_string()))?;
        pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }
    Ok((obj_type, size, pos))
}

/// Read an `OFS_DELTA`'s variable-length negative offset encoding.
fn read_offset_delta(data: &[u8], mut pos: usize) -> Result<(usize, usize), GitError> {
    let mut byte = *data.get(pos).ok_or_else(|| GitError::PackParse("truncated pack".to_string()))?;
    pos += 1;
    let mut value = (byte & 0x7f) as u64;
    while byte & 0x80 != 0 {
        byte = *data.get(pos).ok_or_else(|| GitError::PackParse("truncated pack".to_string()))?;
        pos += 1;
        value = ((value + 1) << 7) | (byte & 0x7f) as u64;
    }
    Ok((value as usize, pos))
}

/// Zlib-inflate one object's compressed body starting at `pos`, returning
/// the inflated bytes and how many compressed bytes were consumed.
fn inflate_at(data: &[u8], pos: usize) -> Result<(Vec<u8>, usize), GitError> {
    let slice = &data[pos..];
    let mut decoder = ZlibDecoder::new(slice);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| GitError::PackParse(format!("zlib inflate failed: {e}")))?;
    let consumed = decoder.total_in() as usize;
    Ok((out, consumed))
}

/// Apply a git delta (base-copy/insert instructions) to `base`, producing
/// the target object's bytes.
fn apply_delta(base: &[u8], delta: &[u8]) -> Vec<u8> {
    let mut pos = 0;
    let (_base_size, consumed) = read_varint_size(delta, pos);
    pos += consumed;
    let (target_size, consumed) = read_varint_size(delta, pos);
    pos += consumed;
    let mut out = Vec::with_capacity(target_size as usize);
    while pos < delta.len() {
        let opcode = delta[pos];
        pos += 1;
        if opcode & 0x80 != 0 {
            let mut offset: u32 = 0;
            let mut size: u32 = 0;
            for bit in 0..4 {
                if opcode & (1 << bit) != 0 {
                    offset |= (delta[pos] as u32) << (bit * 8);
                    pos += 1;
                }
            }
            for bit in 0..3 {
                if opcode & (1 << (4 + bit)) != 0 {
                    size |= (delta[pos] as u32) << (bit * 8);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let start = offset as usize;
            let end = (start + size as usize).min(base.len());
            if start < base.len() {
                out.extend_from_slice(&base[start..end]);
            }
        } else if opcode != 0 {
            let len = opcode as usize;
            out.extend_from_slice(&delta[pos..pos + len]);
            pos += len;
        } else {
            break;
        }
    }
    out
}

fn read_varint_size(data: &[u8], mut pos: usize) -> (u64, usize) {
    let start = pos;
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = data[pos];
        pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    (value, pos - start)
}

/// Verify the pack's trailing SHA-1 checksum against the bytes preceding
/// it (the last 20 bytes of `data`). Returns `false` rather than erroring
/// so a checksum mismatch degrades to a warning, not a hard clone failure.
pub fn verify_checksum(data: &[u8]) -> bool {
    if data.len() < 20 {
        return false;
    }
    let (body, trailer) = data.split_at(data.len() - 20);
    let mut hasher = Sha1::new();
    hasher.update(body);
    let digest = hasher.finalize();
    digest.as_slice() == trailer
}
