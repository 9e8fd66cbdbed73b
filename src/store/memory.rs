//! In-process `Backend` used by the native binary and by every test. Real
//! persistence across restarts only exists in the browser (`wasm` module);
//! native Foam is a scratch sandbox, same as the teacher's in-memory
//! caches (`memory::CompositeMemoryStore`'s `cached_project`) backed a
//! `Mutex` rather than a lock-free structure, since writes are already
//! serialized by the single-threaded cooperative shell.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::Backend;

#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }

    async fn put(&self, key: &str, value: Vec<u8>) {
        self.data.lock().unwrap().insert(key.to_string(), value);
    }

    async fn delete(&self, key: &str) {
        self.data.lock().unwrap().remove(key);
    }

    async fn list(&self, prefix: &str) -> Vec<String> {
        let guard = self.data.lock().unwrap();
        let base = if prefix == "/" {
            "/".to_string()
        } else {
            format!("{}/", prefix)
        };
        let mut children: Vec<String> = guard
            .keys()
            .filter_map(|k| {
                if k == prefix {
                    return None;
                }
                let rest = k.strip_prefix(&base)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(k.clone())
                }
            })
            .collect();
        children.sort();
        children
    }

    async fn clear(&self) {
        self.data.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = MemoryBackend::new();
        backend.put("/a", b"hello".to_vec()).await;
        assert_eq!(backend.get("/a").await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn list_returns_only_direct_children() {
        let backend = MemoryBackend::new();
        backend.put("/a", vec![]).await;
        backend.put("/a/b", vec![]).await;
        backend.put("/a/b/c", vec![]).await;
        backend.put("/a/d", vec![]).await;
        let children = backend.list("/a").await;
        assert_eq!(children, vec!["/a/b".to_string(), "/a/d".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let backend = MemoryBackend::new();
        backend.put("/a", vec![1]).await;
        backend.delete("/a").await;
        assert_eq!(backend.get("/a").await, None);
    }
}
