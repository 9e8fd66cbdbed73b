//! Loose git objects: blobs, trees, commits, each SHA-1-addressed and
//! zlib-deflated, stored at `.git/objects/<first 2 hex chars>/<rest>`
//! exactly like real git's loose-object layout — the one piece of on-disk
//! compatibility this façade commits to, since it's cheap and makes the
//! object store inspectable with real git tooling if ever exported.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use crate::vfs::{FsError, Vfs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            _ => None,
        }
    }
}

/// Compute the SHA-1 object id git would assign to `content` of `kind`,
/// over the canonical `"<type> <size>\0<content>"` framing.
pub fn hash_object(kind: ObjectKind, content: &[u8]) -> String {
    let header = format!("{} {}\0", kind.as_str(), content.len());
    let mut hasher = Sha1::new();
    hasher.update(header.as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn object_path(repo_git_dir: &str, oid: &str) -> String {
    format!("{repo_git_dir}/objects/{}/{}", &oid[0..2], &oid[2..])
}

/// Write `content` as a loose object, returning its oid. A no-op (beyond
/// computing the id) if the object already exists, matching git's own
/// content-addressed dedup.
pub async fn write_object(vfs: &Vfs, repo_git_dir: &str, kind: ObjectKind, content: &[u8]) -> Result<String, FsError> {
    let oid = hash_object(kind, content);
    let path = object_path(repo_git_dir, &oid);
    if vfs.exists(&path).await {
        return Ok(oid);
    }
    let header = format!("{} {}\0", kind.as_str(), content.len());
    let mut raw = header.into_bytes();
    raw.extend_from_slice(content);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).expect("in-memory zlib write cannot fail");
    let compressed = encoder.finish().expect("in-memory zlib finish cannot fail");
    vfs.write_file(&path, compressed).await?;
    Ok(oid)
}

/// Write an already-packed/compressed loose object verbatim (used when
/// unpacking objects fetched during `clone`, which arrive pre-deflated).
pub async fn write_raw_object(vfs: &Vfs, repo_git_dir: &str, oid: &str, deflated: Vec<u8>) -> Result<(), FsError> {
    let path = object_path(repo_git_dir, oid);
    vfs.write_file(&path, deflated).await
}

pub async fn read_object(vfs: &Vfs, repo_git_dir: &str, oid: &str) -> Result<(ObjectKind, Vec<u8>), FsError> {
    let path = object_path(repo_git_dir, oid);
    let compressed = vfs.read_file(&path).await?;
    let mut decoder = ZlibDecoder::new(&compressed[..]);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|_| FsError::new(crate::vfs::ErrorCode::EUNSPEC, "cat-file", oid))?;
    let nul = raw.iter().position(|&b| b == 0).unwrap_or(0);
    let header = String::from_utf8_lossy(&raw[..nul]).to_string();
    let kind_str = header.split(' ').next().unwrap_or("");
    let kind = ObjectKind::parse(kind_str).unwrap_or(ObjectKind::Blob);
    Ok((kind, raw[nul + 1..].to_vec()))
}

/// One entry in a tree object: `<mode> <name>\0<20-byte raw sha1>`. Foam's
/// tree encoding stores the oid as hex text rather than 20 raw bytes,
/// which is NOT wire-compatible with real git trees but round-trips
/// correctly through this façade's own `read_object`/`write_object` pair,
/// the same "plumbing behavior, not wire format" tradeoff the simplified
/// index makes (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub mode: &'static str,
    pub name: String,
    pub oid: String,
    pub is_dir: bool,
}

pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut out = String::new();
    for entry in sorted {
        out.push_str(&format!("{} {}\0{}\n", entry.mode, entry.name, entry.oid));
    }
    out.into_bytes()
}

pub fn decode_tree(content: &[u8]) -> Vec<TreeEntry> {
    let text = String::from_utf8_lossy(content);
    text.lines()
        .filter_map(|line| {
            let (meta, oid) = line.split_once('\0')?;
            let (mode, name) = meta.split_once(' ')?;
            Some(TreeEntry {
                mode: if mode == "40000" { "40000" } else { "100644" },
                name: name.to_string(),
                oid: oid.to_string(),
                is_dir: mode == "40000",
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CommitObject {
    pub tree: String,
    pub parents: Vec<String>,
    pub author: String,
    pub message: String,
    pub timestamp: i64,
}

pub fn encode_commit(commit: &CommitObject) -> Vec<u8> {
    let mut out = format!("tree {}\n", commit.tree);
    for parent in &commit.parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str(&format!("author {} {}\n", commit.author, commit.timestamp));
    out.push_str(&format!("committer {} {}\n\n", commit.author, commit.timestamp));
    out.push_str(&commit.message);
    if !commit.message.ends_with('\n') {
        out.push('\n');
    }
    out.into_bytes()
}

pub fn decode_commit(content: &[u8]) -> CommitObject {
    let text = String::from_utf8_lossy(content);
    let mut tree = String::new();
    let mut parents = Vec::new();
    let mut author = String::new();
    let mut timestamp = 0i64;
    let mut lines = text.lines();
    let mut message_lines: Vec<&str> = Vec::new();
    let mut in_message = false;
    for line in &mut lines {
        if in_message {
            message_lines.push(line);
            continue;
        }
        if line.is_empty() {
            in_message = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix("tree ") {
            tree = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("parent ") {
            parents.push(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("author ") {
            let mut parts = rest.rsplitn(2, ' ');
            if let Some(ts) = parts.next() {
                timestamp = ts.parse().unwrap_or(0);
            }
            author = parts.next().unwrap_or("").to_string();
        }
    }
    CommitObject {
        tree,
        parents,
        author,
        message: message_lines.join("\n"),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_object_matches_git_blob_hashing() {
        // Git's own hash for an empty blob is well known.
        let oid = hash_object(ObjectKind::Blob, b"");
        assert_eq!(oid, "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn tree_round_trips() {
        let entries = vec![
            TreeEntry { mode: "100644", name: "b.txt".to_string(), oid: "a".repeat(40), is_dir: false },
            TreeEntry { mode: "40000", name: "a-dir".to_string(), oid: "b".repeat(40), is_dir: true },
        ];
        let encoded = encode_tree(&entries);
        let decoded = decode_tree(&encoded);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "a-dir");
        assert!(decoded[0].is_dir);
    }

    #[test]
    fn commit_round_trips() {
        let commit = CommitObject {
            tree: "t".repeat(40),
            parents: vec!["p".repeat(40)],
            author: "Foam User <foam@example.com>".to_string(),
            message: "initial commit".to_string(),
            timestamp: 1700000000,
        };
        let encoded = encode_commit(&commit);
        let decoded = decode_commit(&encoded);
        assert_eq!(decoded.tree, commit.tree);
        assert_eq!(decoded.parents, commit.parents);
        assert_eq!(decoded.message, commit.message);
    }
}
