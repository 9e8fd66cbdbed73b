//! The wasm32 `Backend`: a thin bridge to a host-provided IndexedDB-backed
//! JS object. Persistence configuration itself (which IndexedDB database,
//! eviction policy, quota handling) is explicitly out of scope per
//! spec.md's Non-goals — this module only defines the calling convention,
//! the same way `quarto-system-runtime` treats its JS host as an external
//! collaborator reached through `#[wasm_bindgen(raw_module = "...")]`
//! rather than vendoring a Rust IndexedDB client.

use async_trait::async_trait;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use super::Backend;

#[wasm_bindgen(raw_module = "/foam_store_bridge.js")]
extern "C" {
    #[wasm_bindgen(js_name = "foamStoreGet")]
    fn store_get(key: &str) -> js_sys::Promise;

    #[wasm_bindgen(js_name = "foamStorePut")]
    fn store_put(key: &str, value: &[u8]) -> js_sys::Promise;

    #[wasm_bindgen(js_name = "foamStoreDelete")]
    fn store_delete(key: &str) -> js_sys::Promise;

    #[wasm_bindgen(js_name = "foamStoreList")]
    fn store_list(prefix: &str) -> js_sys::Promise;

    #[wasm_bindgen(js_name = "foamStoreClear")]
    fn store_clear() -> js_sys::Promise;
}

/// `Backend` over the host's IndexedDB object store, reached via the glue
/// functions declared above. The host page is responsible for providing
/// `foam_store_bridge.js` with matching exports; Foam itself only calls
/// them and assumes they resolve or reject like ordinary JS promises.
pub struct IndexedDbBackend;

impl IndexedDbBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IndexedDbBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Backend for IndexedDbBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = JsFuture::from(store_get(key)).await.ok()?;
        if result.is_undefined() || result.is_null() {
            return None;
        }
        Some(js_sys::Uint8Array::new(&result).to_vec())
    }

    async fn put(&self, key: &str, value: Vec<u8>) {
        let _ = JsFuture::from(store_put(key, &value)).await;
    }

    async fn delete(&self, key: &str) {
        let _ = JsFuture::from(store_delete(key)).await;
    }

    async fn list(&self, prefix: &str) -> Vec<String> {
        let Ok(result) = JsFuture::from(store_list(prefix)).await else {
            return Vec::new();
        };
        let array = js_sys::Array::from(&result);
        array.iter().filter_map(|v| v.as_string()).collect()
    }

    async fn clear(&self) {
        let _ = JsFuture::from(store_clear()).await;
    }
}
