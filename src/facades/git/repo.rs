//! Repository-level plumbing: the index, refs, HEAD, and config, built on
//! top of the loose-object store in `objects`. The index is a simplified
//! JSON file rather than git's packed binary index (see DESIGN.md's Open
//! Question decision) — nothing in spec.md requires wire compatibility
//! with real git's index format, only with its observable behavior.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::path::PathResolver;
use crate::vfs::{FsError, Vfs};

use super::objects::{self, CommitObject, ObjectKind, TreeEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,
    pub oid: String,
}

/// One repository's git state, rooted at `work_dir` (the directory
/// containing `.git`). A `Mutex<()>` serializes index read-modify-write
/// cycles, the same pattern the teacher's `MemoryStore` used
/// (`write_lock`) to keep concurrent writers from interleaving.
pub struct Repository {
    pub vfs: Vfs,
    pub work_dir: String,
    pub git_dir: String,
    write_lock: Mutex<()>,
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("not a git repository (or any of the parent directories): {0}")]
    NotARepo(String),
    #[error("{0}")]
    Fs(#[from] FsError),
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,
    #[error("pathspec '{0}' did not match any files")]
    NoMatchingPathspec(String),
    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),
    #[error("failed to parse packfile: {0}")]
    PackParse(String),
    #[error("unknown branch: {0}")]
    UnknownBranch(String),
    #[error("{0}")]
    Other(String),
}

impl Repository {
    pub fn new(vfs: Vfs, work_dir: impl Into<String>) -> Self {
        let work_dir = work_dir.into();
        let git_dir = PathResolver::join(&work_dir, ".git");
        Self { vfs, work_dir, git_dir, write_lock: Mutex::new(()) }
    }

    pub async fn discover(vfs: Vfs, start_dir: &str) -> Result<Self, GitError> {
        let mut current = start_dir.to_string();
        loop {
            let candidate = PathResolver::join(&current, ".git");
            if vfs.exists(&candidate).await {
                return Ok(Self::new(vfs, current));
            }
            let parent = PathResolver::dirname(&current);
            if parent == current {
                return Err(GitError::NotARepo(start_dir.to_string()));
            }
            current = parent;
        }
    }

    pub async fn init(vfs: Vfs, work_dir: &str) -> Result<Self, GitError> {
        let repo = Self::new(vfs, work_dir);
        for dir in ["objects", "refs", "refs/heads"] {
            let path = PathResolver::join(&repo.git_dir, dir);
            repo.vfs.mkdir(&path, true).await?;
        }
        let head_path = PathResolver::join(&repo.git_dir, "HEAD");
        if !repo.vfs.exists(&head_path).await {
            repo.vfs.write_file(&head_path, b"ref: refs/heads/main\n".to_vec()).await?;
        }
        let config_path = PathResolver::join(&repo.git_dir, "config");
        if !repo.vfs.exists(&config_path).await {
            repo.vfs.write_file(&config_path, b"{}".to_vec()).await?;
        }
        Ok(repo)
    }

    // --- index -----------------------------------------------------

    fn index_path(&self) -> String {
        PathResolver::join(&self.git_dir, "index.json")
    }

    pub async fn read_index(&self) -> Vec<IndexEntry> {
        match self.vfs.read_file(&self.index_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn write_index(&self, entries: &[IndexEntry]) -> Result<(), GitError> {
        let bytes = serde_json::to_vec(entries).expect("index serializes");
        self.vfs.write_file(&self.index_path(), bytes).await?;
        Ok(())
    }

    /// Record `path` -> `oid` directly, without hashing from a working-tree
    /// file — used by `clone`, where the blob is already unpacked and
    /// written as a loose object before the working tree is materialized.
    pub async fn add_blob_to_index(&self, path: &str, oid: &str) -> Result<(), GitError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut index = self.read_index().await;
        index.retain(|e| e.path != path);
        index.push(IndexEntry { path: path.to_string(), oid: oid.to_string() });
        self.write_index(&index).await
    }

    /// Stage every file under `pathspec` (relative to the work dir),
    /// writing blob objects for each and updating the index.
    pub async fn add(&self, pathspec: &str) -> Result<usize, GitError> {
        let _guard = self.write_lock.lock().unwrap();
        let abs = PathResolver::join(&self.work_dir, pathspec);
        let mut files = Vec::new();
        self.collect_files(&abs, &mut files).await;
        if files.is_empty() {
            return Err(GitError::NoMatchingPathspec(pathspec.to_string()));
        }
        let mut index = self.read_index().await;
        for file in &files {
            let content = self.vfs.read_file(file).await?;
            let oid = objects::write_object(&self.vfs, &self.git_dir, ObjectKind::Blob, &content).await?;
            let rel = file.strip_prefix(&self.work_dir).unwrap_or(file).trim_start_matches('/').to_string();
            index.retain(|e| e.path != rel);
            index.push(IndexEntry { path: rel, oid });
        }
        self.write_index(&index).await?;
        Ok(files.len())
    }

    fn collect_files<'a>(&'a self, path: &'a str, out: &'a mut Vec<String>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>> {
        Box::pin(async move {
            if path.contains("/.git") {
                return;
            }
            match self.vfs.stat(path).await {
                Ok(stat) if stat.is_directory() => {
                    if let Ok(names) = self.vfs.readdir(path).await {
                        for name in names {
                            let child = PathResolver::join(path, &name);
                            self.collect_files(&child, out).await;
                        }
                    }
                }
                Ok(_) => out.push(path.to_string()),
                Err(_) => {}
            }
        })
    }

    // --- commit ------------------------------------------------------

    pub async fn commit(&self, message: &str, author: &str) -> Result<String, GitError> {
        let _guard = self.write_lock.lock().unwrap();
        let index = self.read_index().await;
        if index.is_empty() {
            return Err(GitError::NothingToCommit);
        }
        let tree_oid = self.write_tree_from_index(&index).await?;
        let parent = self.current_commit_oid().await;
        let commit = CommitObject {
            tree: tree_oid,
            parents: parent.into_iter().collect(),
            author: author.to_string(),
            message: message.to_string(),
            timestamp: now_secs(),
        };
        let encoded = objects::encode_commit(&commit);
        let oid = objects::write_object(&self.vfs, &self.git_dir, ObjectKind::Commit, &encoded).await?;
        self.update_current_branch(&oid).await?;
        Ok(oid)
    }

    async fn write_tree_from_index(&self, index: &[IndexEntry]) -> Result<String, GitError> {
        // Build a single flat tree; nested directories are encoded as
        // `/`-containing names rather than nested tree objects. This keeps
        // the tree walk simple while preserving every path's content.
        let mut entries = Vec::new();
        for entry in index {
            entries.push(TreeEntry {
                mode: "100644",
                name: entry.path.clone(),
                oid: entry.oid.clone(),
                is_dir: false,
            });
        }
        let encoded = objects::encode_tree(&entries);
        objects::write_object(&self.vfs, &self.git_dir, ObjectKind::Tree, &encoded)
            .await
            .map_err(GitError::from)
    }

    // --- refs / HEAD ---------------------------------------------------

    pub async fn current_branch(&self) -> String {
        let head_path = PathResolver::join(&self.git_dir, "HEAD");
        match self.vfs.read_file(&head_path).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                text.strip_prefix("ref: refs/heads/").unwrap_or("main").to_string()
            }
            Err(_) => "main".to_string(),
        }
    }

    pub async fn current_commit_oid(&self) -> Option<String> {
        let branch = self.current_branch().await;
        let ref_path = PathResolver::join(&self.git_dir, &format!("refs/heads/{branch}"));
        self.vfs
            .read_file(&ref_path)
            .await
            .ok()
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
    }

    async fn update_current_branch(&self, oid: &str) -> Result<(), GitError> {
        self.set_head_commit(oid).await
    }

    /// Point the current branch directly at `oid` — used by `commit` and,
    /// separately, by `clone` to seed the default branch from the fetched
    /// commit before a working tree or index exists.
    pub async fn set_head_commit(&self, oid: &str) -> Result<(), GitError> {
        let branch = self.current_branch().await;
        let ref_path = PathResolver::join(&self.git_dir, &format!("refs/heads/{branch}"));
        self.vfs.write_file(&ref_path, oid.as_bytes().to_vec()).await?;
        Ok(())
    }

    pub async fn list_branches(&self) -> Vec<String> {
        let heads_dir = PathResolver::join(&self.git_dir, "refs/heads");
        self.vfs
            .readdir(&heads_dir)
            .await
            .unwrap_or_default()
    }

    pub async fn create_branch(&self, name: &str) -> Result<(), GitError> {
        let oid = self.current_commit_oid().await.ok_or(GitError::NothingToCommit)?;
        let ref_path = PathResolver::join(&self.git_dir, &format!("refs/heads/{name}"));
        self.vfs.write_file(&ref_path, oid.into_bytes()).await?;
        Ok(())
    }

    pub async fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        let ref_path = PathResolver::join(&self.git_dir, &format!("refs/heads/{name}"));
        if !self.vfs.exists(&ref_path).await {
            return Err(GitError::UnknownBranch(name.to_string()));
        }
        let head_path = PathResolver::join(&self.git_dir, "HEAD");
        self.vfs
            .write_file(&head_path, format!("ref: refs/heads/{name}\n").into_bytes())
            .await?;
        self.restore_working_tree().await
    }

    /// Overwrite working-tree files from the current commit's tree —
    /// used after `checkout` and after a fresh `clone`.
    pub async fn restore_working_tree(&self) -> Result<(), GitError> {
        let Some(commit_oid) = self.current_commit_oid().await else {
            return Ok(());
        };
        let (_, commit_bytes) = objects::read_object(&self.vfs, &self.git_dir, &commit_oid).await?;
        let commit = objects::decode_commit(&commit_bytes);
        let (_, tree_bytes) = objects::read_object(&self.vfs, &self.git_dir, &commit.tree).await?;
        let entries = objects::decode_tree(&tree_bytes);
        let commit_mtime_ms = commit.timestamp * 1000;
        for entry in entries {
            let (_, blob) = objects::read_object(&self.vfs, &self.git_dir, &entry.oid).await?;
            let path = PathResolver::join(&self.work_dir, &entry.path);
            let parent = PathResolver::dirname(&path);
            if !self.vfs.exists(&parent).await {
                self.vfs.mkdir(&parent, true).await?;
            }
            self.vfs.write_file(&path, blob).await?;
            self.vfs.utimes(&path, commit_mtime_ms, commit_mtime_ms).await?;
        }
        Ok(())
    }

    // --- config / remotes ----------------------------------------------

    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        let config_path = PathResolver::join(&self.git_dir, "config");
        let mut map = self.read_config_map().await;
        map.insert(key.to_string(), value.to_string());
        let bytes = serde_json::to_vec(&map).expect("config serializes");
        self.vfs.write_file(&config_path, bytes).await?;
        Ok(())
    }

    pub async fn get_config(&self, key: &str) -> Option<String> {
        self.read_config_map().await.get(key).cloned()
    }

    async fn read_config_map(&self) -> std::collections::BTreeMap<String, String> {
        let config_path = PathResolver::join(&self.git_dir, "config");
        match self.vfs.read_file(&config_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Default::default(),
        }
    }

    pub async fn set_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.set_config(&format!("remote.{name}.url"), url).await
    }

    pub async fn get_remote(&self, name: &str) -> Option<String> {
        self.get_config(&format!("remote.{name}.url")).await
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;
    use std::sync::Arc;

    async fn repo_at(dir: &str) -> Repository {
        let vfs = Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await;
        vfs.mkdir(dir, true).await.unwrap();
        Repository::init(vfs, dir).await.unwrap()
    }

    #[tokio::test]
    async fn init_creates_git_dir_and_default_branch() {
        let repo = repo_at("/home/foam/proj").await;
        assert!(repo.vfs.exists("/home/foam/proj/.git/HEAD").await);
        assert_eq!(repo.current_branch().await, "main");
    }

    #[tokio::test]
    async fn add_then_commit_records_history() {
        let repo = repo_at("/home/foam/proj").await;
        repo.vfs.write_file("/home/foam/proj/a.txt", b"hello".to_vec()).await.unwrap();
        repo.add("a.txt").await.unwrap();
        let oid = repo.commit("initial commit", "Foam User <foam@example.com>").await.unwrap();
        assert_eq!(repo.current_commit_oid().await, Some(oid));
    }

    #[tokio::test]
    async fn commit_with_empty_index_fails() {
        let repo = repo_at("/home/foam/proj").await;
        let err = repo.commit("nothing", "a").await;
        assert!(matches!(err, Err(GitError::NothingToCommit)));
    }

    #[tokio::test]
    async fn branch_and_checkout_round_trip() {
        let repo = repo_at("/home/foam/proj").await;
        repo.vfs.write_file("/home/foam/proj/a.txt", b"x".to_vec()).await.unwrap();
        repo.add("a.txt").await.unwrap();
        repo.commit("c1", "a").await.unwrap();
        repo.create_branch("feature").await.unwrap();
        repo.checkout_branch("feature").await.unwrap();
        assert_eq!(repo.current_branch().await, "feature");
    }
}
