//! The durable key-value backend the VFS is built on (spec.md §4.2's
//! `Store` interface). Foam never talks to a real filesystem: every inode
//! is a value keyed by its normalized path in whatever `Backend`
//! implementation the host provides — an in-process map in tests and the
//! native binary, a bridge to the browser's IndexedDB when compiled to
//! wasm32.

pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

use async_trait::async_trait;

pub const ROOT_DIRS: &[&str] = &["/", "/home", "/tmp", "/bin", "/etc", "/var", "/dev"];

/// A raw, path-keyed byte store. Values are the serialized form of a
/// `vfs::Inode`; the VFS layer owns serialization, `Backend` only owns
/// durability.
///
/// wasm32 builds talk to JS promises, which aren't `Send`, so the trait
/// drops the `Send` bound on that target (mirroring `async_trait`'s own
/// `?Send` escape hatch) while keeping it on native targets where the
/// executor needs to move backends across threads.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Backend: Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, value: Vec<u8>);
    async fn delete(&self, key: &str);
    /// All keys that are direct children of `prefix` (a directory path),
    /// one path segment deep — the VFS layer builds directory listings
    /// from this rather than from a separate directory-entries value.
    async fn list(&self, prefix: &str) -> Vec<String>;
    async fn clear(&self);
}

/// Seed the standard directory tree (`/`, `/home`, `/home/<user>`, `/tmp`,
/// `/bin`, `/etc`, `/var`, `/dev`) into an otherwise-empty VFS, per
/// spec.md §4.2's init routine. Takes the inode-construction closure so the
/// `store` module doesn't need to depend on `vfs`'s `Inode` type directly.
pub async fn seed_roots<F>(backend: &dyn Backend, user_home: &str, mut make_dir: F)
where
    F: FnMut() -> Vec<u8>,
{
    for dir in ROOT_DIRS {
        if backend.get(dir).await.is_none() {
            backend.put(dir, make_dir()).await;
        }
    }
    if backend.get(user_home).await.is_none() {
        backend.put(user_home, make_dir()).await;
    }
}
