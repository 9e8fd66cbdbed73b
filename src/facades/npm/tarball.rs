//! gzip decompression and TAR extraction for `npm install` (spec.md §4.8
//! steps 4-5): a `.tgz` byte buffer in, a `node_modules/<pkg>/...` subtree
//! written into the VFS out. Both buffers are fully in memory by the time
//! this runs (the façade already holds the whole tarball after `fetch`),
//! so decompression and parsing are plain synchronous calls around the
//! handful of VFS writes that actually need to be awaited.

use std::io::Read;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::path::PathResolver;
use crate::vfs::Vfs;

use super::NpmError;

/// Decompress and unpack `tarball_bytes` (a gzipped npm tarball, whose
/// entries are always rooted under a `package/` prefix) into
/// `<install_dir>/node_modules/<pkg_name>/`. Returns the number of regular
/// files written; directories and skipped entries (symlinks, devices, ...)
/// don't count.
pub async fn extract(vfs: &Vfs, install_dir: &str, pkg_name: &str, tarball_bytes: &[u8]) -> Result<usize, NpmError> {
    let mut decoder = GzDecoder::new(tarball_bytes);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| NpmError::TarballDecode(e.to_string()))?;

    let dest_root = format!("{}/node_modules/{pkg_name}", install_dir.trim_end_matches('/'));
    vfs.mkdir(&dest_root, true).await?;

    let mut archive = Archive::new(&raw[..]);
    let mut entries = archive.entries().map_err(|e| NpmError::TarballDecode(e.to_string()))?;
    let mut written = 0usize;
    while let Some(entry) = entries.next() {
        let mut entry = entry.map_err(|e| NpmError::TarballDecode(e.to_string()))?;
        let entry_type = entry.header().entry_type();
        let raw_path = entry
            .path()
            .map_err(|e| NpmError::TarballDecode(e.to_string()))?
            .to_string_lossy()
            .to_string();
        let rel_path = raw_path.strip_prefix("package/").unwrap_or(&raw_path).to_string();
        if rel_path.is_empty() {
            continue;
        }
        if rel_path.split('/').any(|segment| segment == "..") {
            debug!(path = %rel_path, "npm: skipping tar entry that escapes the package root");
            continue;
        }

        if entry_type.is_dir() {
            let dir_path = format!("{dest_root}/{}", rel_path.trim_end_matches('/'));
            vfs.mkdir(&dir_path, true).await?;
            continue;
        }
        if !entry_type.is_file() {
            debug!(path = %rel_path, "npm: skipping non-regular tar entry");
            continue;
        }

        let mtime_ms = entry.header().mtime().ok().map(|secs| secs as i64 * 1000);
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(|e| NpmError::TarballDecode(e.to_string()))?;
        let file_path = format!("{dest_root}/{rel_path}");
        let parent = PathResolver::dirname(&file_path);
        if !vfs.exists(&parent).await {
            vfs.mkdir(&parent, true).await?;
        }
        vfs.write_file(&file_path, buf).await?;
        if let Some(mtime_ms) = mtime_ms {
            vfs.utimes(&file_path, mtime_ms, mtime_ms).await?;
        }
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;
    use std::io::Write as _;
    use std::sync::Arc;

    fn make_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            for (name, content) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, format!("package/{name}"), *content).unwrap();
            }
            builder.finish().unwrap();
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn extracts_files_stripping_package_prefix() {
        let backend = Arc::new(MemoryBackend::new());
        let vfs = Vfs::new(backend, "foam", "/home/foam").await;
        let tarball = make_tarball(&[("package.json", b"{\"name\":\"demo\"}"), ("lib/index.js", b"module.exports = 1;")]);
        let written = extract(&vfs, "/home/foam", "demo", &tarball).await.unwrap();
        assert_eq!(written, 2);
        let pkg_json = vfs.read_file("/home/foam/node_modules/demo/package.json").await.unwrap();
        assert_eq!(pkg_json, b"{\"name\":\"demo\"}");
        let lib = vfs.read_file("/home/foam/node_modules/demo/lib/index.js").await.unwrap();
        assert_eq!(lib, b"module.exports = 1;");
    }

    #[tokio::test]
    async fn rejects_entries_that_escape_the_package_root() {
        let backend = Arc::new(MemoryBackend::new());
        let vfs = Vfs::new(backend, "foam", "/home/foam").await;
        let tarball = make_tarball(&[
            ("package.json", b"{\"name\":\"demo\"}"),
            ("../../escape.txt", b"pwned"),
        ]);
        let written = extract(&vfs, "/home/foam", "demo", &tarball).await.unwrap();
        assert_eq!(written, 1);
        assert!(!vfs.exists("/home/foam/escape.txt").await);
        assert!(!vfs.exists("/escape.txt").await);
    }
}
