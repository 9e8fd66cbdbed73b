//! The virtual filesystem: POSIX-ish semantics over the path-keyed
//! `store::Backend`. This is the layer spec.md §4.2/§4.3 describes as
//! "durable POSIX-semantic filesystem" — every operation here is the thing
//! a coreutil or a façade actually calls; the shell never touches `Backend`
//! directly.

pub mod error;
mod glob;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub use error::{ErrorCode, FsError};

use crate::path::PathResolver;
use crate::store::Backend;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeKind {
    File,
    Directory,
    Symlink,
}

/// A single filesystem entry: a file's bytes, a directory marker, or a
/// symlink's target, plus the POSIX metadata triple (mtime/ctime/atime)
/// spec.md's DATA MODEL names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inode {
    pub path: String,
    pub kind: InodeKind,
    pub mode: u32,
    #[serde(with = "serde_bytes_vec", default)]
    pub content: Vec<u8>,
    /// Symlink target, when `kind == Symlink`.
    pub link_target: Option<String>,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub atime_ms: i64,
}

/// `serde` doesn't derive an efficient byte-vec encoding by default; this
/// is the same base64-free, JSON-array encoding serde_json already gives
/// `Vec<u8>` — naming the module documents that the encoding is
/// deliberate, not accidental, for anyone swapping the wire format later.
mod serde_bytes_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        bytes.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Vec::deserialize(d)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Inode {
    fn new_file(path: impl Into<String>, content: Vec<u8>) -> Self {
        let now = now_ms();
        Self {
            path: path.into(),
            kind: InodeKind::File,
            mode: 0o644,
            content,
            link_target: None,
            mtime_ms: now,
            ctime_ms: now,
            atime_ms: now,
        }
    }

    fn new_dir(path: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            path: path.into(),
            kind: InodeKind::Directory,
            mode: 0o755,
            content: Vec::new(),
            link_target: None,
            mtime_ms: now,
            ctime_ms: now,
            atime_ms: now,
        }
    }

    fn new_symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            path: path.into(),
            kind: InodeKind::Symlink,
            mode: 0o777,
            content: Vec::new(),
            link_target: Some(target.into()),
            mtime_ms: now,
            ctime_ms: now,
            atime_ms: now,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == InodeKind::Symlink
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    fn touch_mtime(&mut self) {
        let now = now_ms();
        self.mtime_ms = now;
        self.ctime_ms = now;
    }
}

/// File metadata returned by `stat`/`lstat`, mirroring the subset of
/// Node's `fs.Stats` the fs-adapter contract (spec.md §4.4) exposes.
#[derive(Debug, Clone)]
pub struct Stat {
    pub kind: InodeKind,
    pub mode: u32,
    pub size: u64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub atime_ms: i64,
}

impl Stat {
    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File
    }
    pub fn is_directory(&self) -> bool {
        self.kind == InodeKind::Directory
    }
    pub fn is_symbolic_link(&self) -> bool {
        self.kind == InodeKind::Symlink
    }
}

const MAX_SYMLINK_DEPTH: u32 = 40;

/// The virtual filesystem. Cheaply clonable (an `Arc<Backend>` and a
/// resolver handle underneath) so the shell, the git façade, and the npm
/// façade can each hold their own handle without sharing a lock across
/// unrelated call sites.
#[derive(Clone)]
pub struct Vfs {
    backend: Arc<dyn Backend>,
    resolver: Arc<Mutex<PathResolver>>,
}

impl Vfs {
    /// Construct a VFS over `backend`, seeding the standard directory tree
    /// (spec.md §4.2) if it isn't already present.
    pub async fn new(backend: Arc<dyn Backend>, user: &str, home: &str) -> Self {
        crate::store::seed_roots(backend.as_ref(), home, || {
            serde_json::to_vec(&Inode::new_dir("")).expect("inode serializes")
        })
        .await;
        let _ = user;
        Self {
            backend,
            resolver: Arc::new(Mutex::new(PathResolver::new(home))),
        }
    }

    pub async fn set_home(&self, home: &str) {
        self.resolver.lock().await.set_home(home);
    }

    pub async fn resolve(&self, cwd: &str, path: &str) -> String {
        self.resolver.lock().await.resolve(cwd, path)
    }

    async fn load(&self, path: &str) -> Option<Inode> {
        let bytes = self.backend.get(path).await?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn store(&self, inode: &Inode) {
        let bytes = serde_json::to_vec(inode).expect("inode serializes");
        self.backend.put(&inode.path, bytes).await;
    }

    /// Follow symlinks (up to `MAX_SYMLINK_DEPTH`) to find the real inode
    /// backing `path`. Returns `ELOOP` past the depth cap.
    async fn resolve_links(&self, syscall: &'static str, path: &str) -> FsResult<Inode> {
        let mut current = path.to_string();
        for _ in 0..MAX_SYMLINK_DEPTH {
            let inode = self
                .load(&current)
                .await
                .ok_or_else(|| FsError::enoent(syscall, path))?;
            match inode.kind {
                InodeKind::Symlink => {
                    let target = inode.link_target.clone().unwrap_or_default();
                    current = if target.starts_with('/') {
                        target
                    } else {
                        crate::path::PathResolver::join(&crate::path::PathResolver::dirname(&current), &target)
                    };
                }
                _ => return Ok(inode),
            }
        }
        Err(FsError::eloop(syscall, path))
    }

    async fn require_parent_dir(&self, syscall: &'static str, path: &str) -> FsResult<()> {
        let parent = PathResolver::dirname(path);
        if parent == path {
            return Ok(());
        }
        match self.resolve_links(syscall, &parent).await {
            Ok(inode) if inode.is_dir() => Ok(()),
            Ok(_) => Err(FsError::enotdir(syscall, parent)),
            Err(_) => Err(FsError::enoent(syscall, parent)),
        }
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.load(path).await.is_some()
    }

    pub async fn stat(&self, path: &str) -> FsResult<Stat> {
        let inode = self.resolve_links("stat", path).await?;
        Ok(Stat {
            kind: inode.kind,
            mode: inode.mode,
            size: inode.size(),
            mtime_ms: inode.mtime_ms,
            ctime_ms: inode.ctime_ms,
            atime_ms: inode.atime_ms,
        })
    }

    pub async fn lstat(&self, path: &str) -> FsResult<Stat> {
        let inode = self.load(path).await.ok_or_else(|| FsError::enoent("lstat", path))?;
        Ok(Stat {
            kind: inode.kind,
            mode: inode.mode,
            size: inode.size(),
            mtime_ms: inode.mtime_ms,
            ctime_ms: inode.ctime_ms,
            atime_ms: inode.atime_ms,
        })
    }

    pub async fn mkdir(&self, path: &str, recursive: bool) -> FsResult<()> {
        if let Some(existing) = self.load(path).await {
            if recursive && existing.is_dir() {
                return Ok(());
            }
            return Err(FsError::eexist("mkdir", path));
        }
        if recursive {
            let parent = PathResolver::dirname(path);
            if parent != path && !self.exists(&parent).await {
                Box::pin(self.mkdir(&parent, true)).await?;
            }
        } else {
            self.require_parent_dir("mkdir", path).await?;
        }
        self.store(&Inode::new_dir(path)).await;
        Ok(())
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let inode = self.load(path).await.ok_or_else(|| FsError::enoent("rmdir", path))?;
        if !inode.is_dir() {
            return Err(FsError::enotdir("rmdir", path));
        }
        if !self.backend.list(path).await.is_empty() {
            return Err(FsError::enotempty("rmdir", path));
        }
        self.backend.delete(path).await;
        Ok(())
    }

    pub async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let inode = self.resolve_links("scandir", path).await?;
        if !inode.is_dir() {
            return Err(FsError::enotdir("scandir", path));
        }
        let children = self.backend.list(path).await;
        Ok(children
            .into_iter()
            .map(|c| PathResolver::basename(&c))
            .collect())
    }

    pub async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let inode = self.resolve_links("open", path).await?;
        if inode.is_dir() {
            return Err(FsError::eisdir("read", path));
        }
        Ok(inode.content)
    }

    pub async fn write_file(&self, path: &str, content: Vec<u8>) -> FsResult<()> {
        if let Some(existing) = self.load(path).await {
            if existing.is_dir() {
                return Err(FsError::eisdir("open", path));
            }
        } else {
            self.require_parent_dir("open", path).await?;
        }
        let mut inode = Inode::new_file(path, content);
        if let Some(existing) = self.load(path).await {
            inode.mode = existing.mode;
            inode.ctime_ms = existing.ctime_ms;
        }
        self.store(&inode).await;
        Ok(())
    }

    pub async fn append_file(&self, path: &str, content: &[u8]) -> FsResult<()> {
        match self.load(path).await {
            Some(mut inode) if inode.is_dir() => return Err(FsError::eisdir("open", path)),
            Some(mut inode) => {
                inode.content.extend_from_slice(content);
                inode.touch_mtime();
                self.store(&inode).await;
            }
            None => {
                self.require_parent_dir("open", path).await?;
                self.store(&Inode::new_file(path, content.to_vec())).await;
            }
        }
        Ok(())
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let inode = self.load(path).await.ok_or_else(|| FsError::enoent("unlink", path))?;
        if inode.is_dir() {
            return Err(FsError::eisdir("unlink", path));
        }
        self.backend.delete(path).await;
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let inode = self.load(from).await.ok_or_else(|| FsError::enoent("rename", from))?;
        self.require_parent_dir("rename", to).await?;
        let is_dir = inode.is_dir();
        let mut moved = inode;
        moved.path = to.to_string();
        moved.touch_mtime();
        self.store(&moved).await;
        if is_dir {
            let children = self.backend.list(from).await;
            for child in children {
                let rest = child.strip_prefix(from).unwrap_or(&child);
                let dest_child = format!("{}{}", to, rest);
                Box::pin(self.rename(&child, &dest_child)).await?;
            }
        }
        self.backend.delete(from).await;
        Ok(())
    }

    pub async fn copy_file(&self, from: &str, to: &str) -> FsResult<()> {
        let inode = self.resolve_links("copyfile", from).await?;
        if inode.is_dir() {
            return Err(FsError::eisdir("copyfile", from));
        }
        self.require_parent_dir("copyfile", to).await?;
        self.write_file(to, inode.content).await
    }

    pub async fn symlink(&self, target: &str, link_path: &str) -> FsResult<()> {
        if self.load(link_path).await.is_some() {
            return Err(FsError::eexist("symlink", link_path));
        }
        self.require_parent_dir("symlink", link_path).await?;
        self.store(&Inode::new_symlink(link_path, target)).await;
        Ok(())
    }

    pub async fn readlink(&self, path: &str) -> FsResult<String> {
        let inode = self.load(path).await.ok_or_else(|| FsError::enoent("readlink", path))?;
        inode
            .link_target
            .ok_or_else(|| FsError::new(ErrorCode::EUNSPEC, "readlink", path))
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let mut inode = self.load(path).await.ok_or_else(|| FsError::enoent("chmod", path))?;
        inode.mode = mode;
        inode.touch_mtime();
        self.store(&inode).await;
        Ok(())
    }

    /// Thin per spec.md §4.3 ("`chmod`, `utimes`, `exists` are thin"): set
    /// both timestamps to caller-supplied values rather than deriving them
    /// from `SystemTime::now()`, matching Node's `fs.promises.utimes`.
    pub async fn utimes(&self, path: &str, atime_ms: i64, mtime_ms: i64) -> FsResult<()> {
        let mut inode = self.load(path).await.ok_or_else(|| FsError::enoent("utimes", path))?;
        inode.atime_ms = atime_ms;
        inode.mtime_ms = mtime_ms;
        self.store(&inode).await;
        Ok(())
    }

    pub async fn realpath(&self, path: &str) -> FsResult<String> {
        self.resolve_links("realpath", path).await?;
        Ok(path.to_string())
    }

    /// Glob-match `pattern` against every path under `root` (spec.md §4.3
    /// `glob`), using the shell's own glob syntax (`*`, `?`, `**`, `[...]`).
    pub async fn glob(&self, root: &str, pattern: &str) -> Vec<String> {
        let all_paths = self.walk(root).await;
        glob::match_paths(root, pattern, &all_paths)
    }

    async fn walk(&self, root: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_string()];
        while let Some(dir) = stack.pop() {
            let children = self.backend.list(&dir).await;
            for child in children {
                if let Some(inode) = self.load(&child).await {
                    if inode.is_dir() {
                        stack.push(child.clone());
                    }
                    out.push(child);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;

    async fn vfs() -> Vfs {
        Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await
    }

    #[tokio::test]
    async fn init_seeds_root_tree() {
        let fs = vfs().await;
        for dir in ["/", "/home", "/tmp", "/bin", "/etc", "/var", "/dev", "/home/foam"] {
            assert!(fs.exists(dir).await, "{dir} should exist after init");
            assert!(fs.stat(dir).await.unwrap().is_directory());
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = vfs().await;
        fs.write_file("/home/foam/a.txt", b"hello".to_vec()).await.unwrap();
        let content = fs.read_file("/home/foam/a.txt").await.unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn read_missing_file_is_enoent() {
        let fs = vfs().await;
        let err = fs.read_file("/nope").await.unwrap_err();
        assert_eq!(err.code.code_str(), "ENOENT");
        assert_eq!(err.errno(), -2);
    }

    #[tokio::test]
    async fn write_over_existing_dir_is_eisdir() {
        let fs = vfs().await;
        let err = fs.write_file("/home", vec![]).await.unwrap_err();
        assert_eq!(err.code.code_str(), "EISDIR");
    }

    #[tokio::test]
    async fn mkdir_twice_is_eexist() {
        let fs = vfs().await;
        fs.mkdir("/home/foam/proj", false).await.unwrap();
        let err = fs.mkdir("/home/foam/proj", false).await.unwrap_err();
        assert_eq!(err.code.code_str(), "EEXIST");
    }

    #[tokio::test]
    async fn mkdir_recursive_creates_parents() {
        let fs = vfs().await;
        fs.mkdir("/home/foam/a/b/c", true).await.unwrap();
        assert!(fs.stat("/home/foam/a/b").await.unwrap().is_directory());
        assert!(fs.stat("/home/foam/a/b/c").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn rmdir_nonempty_fails() {
        let fs = vfs().await;
        fs.mkdir("/home/foam/a", false).await.unwrap();
        fs.write_file("/home/foam/a/f", vec![]).await.unwrap();
        let err = fs.rmdir("/home/foam/a").await.unwrap_err();
        assert_eq!(err.code.code_str(), "ENOTEMPTY");
    }

    #[tokio::test]
    async fn rename_moves_directory_subtree() {
        let fs = vfs().await;
        fs.mkdir("/home/foam/a", false).await.unwrap();
        fs.write_file("/home/foam/a/f", b"x".to_vec()).await.unwrap();
        fs.rename("/home/foam/a", "/home/foam/b").await.unwrap();
        assert!(!fs.exists("/home/foam/a").await);
        assert_eq!(fs.read_file("/home/foam/b/f").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn symlink_resolves_transparently() {
        let fs = vfs().await;
        fs.write_file("/home/foam/real", b"data".to_vec()).await.unwrap();
        fs.symlink("/home/foam/real", "/home/foam/link").await.unwrap();
        assert_eq!(fs.read_file("/home/foam/link").await.unwrap(), b"data");
        assert_eq!(fs.readlink("/home/foam/link").await.unwrap(), "/home/foam/real");
    }

    #[tokio::test]
    async fn readdir_lists_basenames() {
        let fs = vfs().await;
        fs.write_file("/home/foam/a", vec![]).await.unwrap();
        fs.write_file("/home/foam/b", vec![]).await.unwrap();
        let mut names = fs.readdir("/home/foam").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn utimes_sets_both_timestamps() {
        let fs = vfs().await;
        fs.write_file("/home/foam/a.txt", b"hi".to_vec()).await.unwrap();
        fs.utimes("/home/foam/a.txt", 1_000, 2_000).await.unwrap();
        let stat = fs.stat("/home/foam/a.txt").await.unwrap();
        assert_eq!(stat.atime_ms, 1_000);
        assert_eq!(stat.mtime_ms, 2_000);
    }

    #[tokio::test]
    async fn utimes_on_missing_path_is_enoent() {
        let fs = vfs().await;
        let err = fs.utimes("/nope", 0, 0).await.unwrap_err();
        assert_eq!(err.code.code_str(), "ENOENT");
    }

    #[tokio::test]
    async fn rename_moves_nested_directory_contents() {
        let fs = vfs().await;
        fs.mkdir("/home/foam/src", true).await.unwrap();
        fs.write_file("/home/foam/src/one.txt", b"1".to_vec()).await.unwrap();
        fs.mkdir("/home/foam/src/nested", true).await.unwrap();
        fs.write_file("/home/foam/src/nested/two.txt", b"2".to_vec()).await.unwrap();
        fs.rename("/home/foam/src", "/home/foam/dst").await.unwrap();
        assert!(!fs.exists("/home/foam/src").await);
        assert_eq!(fs.read_file("/home/foam/dst/one.txt").await.unwrap(), b"1");
        assert_eq!(fs.read_file("/home/foam/dst/nested/two.txt").await.unwrap(), b"2");
    }
}
