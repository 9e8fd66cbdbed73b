//! `package.json` read/write helpers shared by every npm subcommand.
//! Unknown fields round-trip through `extra` rather than being dropped, so
//! `npm install` never clobbers hand-edited metadata it doesn't understand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::PathResolver;
use crate::vfs::Vfs;

use super::NpmError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageJson {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl PackageJson {
    pub fn path_at(dir: &str) -> String {
        PathResolver::join(dir, "package.json")
    }

    pub async fn read(vfs: &Vfs, dir: &str) -> Result<Self, NpmError> {
        let path = Self::path_at(dir);
        let bytes = vfs.read_file(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write(&self, vfs: &Vfs, dir: &str) -> Result<(), NpmError> {
        let path = Self::path_at(dir);
        let text = serde_json::to_string_pretty(self)?;
        vfs.write_file(&path, text.into_bytes()).await?;
        Ok(())
    }

    /// A fresh `package.json` body for `npm init`, matching the fields a
    /// real `npm init -y` fills in without prompting.
    pub fn minimal(name: &str) -> Self {
        let mut scripts = BTreeMap::new();
        scripts.insert(
            "test".to_string(),
            "echo \"Error: no test specified\" && exit 1".to_string(),
        );
        Self {
            name: name.to_string(),
            version: default_version(),
            description: String::new(),
            main: "index.js".to_string(),
            scripts,
            dependencies: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;
    use std::sync::Arc;

    async fn vfs() -> Vfs {
        Vfs::new(Arc::new(MemoryBackend::new()), "foam", "/home/foam").await
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = vfs().await;
        let pkg = PackageJson::minimal("demo");
        pkg.write(&fs, "/home/foam").await.unwrap();
        let read_back = PackageJson::read(&fs, "/home/foam").await.unwrap();
        assert_eq!(read_back.name, "demo");
        assert_eq!(read_back.version, "1.0.0");
    }

    #[tokio::test]
    async fn missing_file_is_enoent() {
        let fs = vfs().await;
        let err = PackageJson::read(&fs, "/home/foam").await.unwrap_err();
        assert!(matches!(err, NpmError::Fs(_)));
    }
}
