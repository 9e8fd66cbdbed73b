//! Registry metadata fetch and version resolution (spec.md §4.8 steps 1-3):
//! `GET {registry}/{name}` returns the full document npm's registry serves
//! (`dist-tags`, every published `versions` entry), from which a single
//! version's tarball URL is picked the same way `npm install` itself would.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use super::NpmError;

#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
}

#[derive(Debug, Deserialize)]
struct RegistryDoc {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, VersionDoc>,
}

#[derive(Debug, Deserialize)]
struct VersionDoc {
    dist: DistDoc,
}

#[derive(Debug, Deserialize)]
struct DistDoc {
    tarball: String,
}

/// Split `pkg[@version]` into a bare package name and an optional version
/// spec (a concrete version or a dist-tag like `latest`), honoring scoped
/// packages (`@scope/name[@version]`) whose own leading `@` isn't itself a
/// version separator.
pub fn parse_spec(spec: &str) -> (String, Option<String>) {
    if let Some(stripped) = spec.strip_prefix('@') {
        return match stripped.find('@') {
            Some(idx) => (format!("@{}", &stripped[..idx]), Some(stripped[idx + 1..].to_string())),
            None => (spec.to_string(), None),
        };
    }
    match spec.split_once('@') {
        Some((name, version)) => (name.to_string(), Some(version.to_string())),
        None => (spec.to_string(), None),
    }
}

/// Fetch `{registry_base}/{name}` and resolve `version_spec` (a dist-tag,
/// an exact version, or `None` for `latest`) against it.
pub async fn resolve(registry_base: &str, name: &str, version_spec: Option<&str>) -> Result<ResolvedPackage, NpmError> {
    let url = format!("{}/{}", registry_base.trim_end_matches('/'), name);
    debug!(url = %url, "npm: fetching registry metadata");
    let client = reqwest::Client::new();
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| NpmError::RegistryFetch(e.to_string()))?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(NpmError::NotFound(name.to_string()));
    }
    if !resp.status().is_success() {
        return Err(NpmError::RegistryFetch(format!("{url} returned {}", resp.status())));
    }
    let doc: RegistryDoc = resp.json().await.map_err(|e| NpmError::RegistryFetch(e.to_string()))?;

    let version = match version_spec {
        Some(v) if doc.versions.contains_key(v) => v.to_string(),
        Some(tag) if doc.dist_tags.contains_key(tag) => doc.dist_tags[tag].clone(),
        Some(v) => return Err(NpmError::VersionNotFound(name.to_string(), v.to_string())),
        None => doc
            .dist_tags
            .get("latest")
            .cloned()
            .ok_or_else(|| NpmError::VersionNotFound(name.to_string(), "latest".to_string()))?,
    };
    let Some(version_doc) = doc.versions.get(&version) else {
        return Err(NpmError::VersionNotFound(name.to_string(), version));
    };
    Ok(ResolvedPackage {
        name: name.to_string(),
        version,
        tarball_url: version_doc.dist.tarball.clone(),
    })
}

pub async fn fetch_tarball(url: &str) -> Result<Vec<u8>, NpmError> {
    debug!(url = %url, "npm: downloading tarball");
    let client = reqwest::Client::new();
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| NpmError::RegistryFetch(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(NpmError::RegistryFetch(format!("{url} returned {}", resp.status())));
    }
    resp.bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| NpmError::RegistryFetch(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_spec_splits_name_and_version() {
        assert_eq!(parse_spec("is-number"), ("is-number".to_string(), None));
        assert_eq!(parse_spec("is-number@7.0.0"), ("is-number".to_string(), Some("7.0.0".to_string())));
    }

    #[test]
    fn parse_spec_handles_scoped_packages() {
        assert_eq!(parse_spec("@babel/core"), ("@babel/core".to_string(), None));
        assert_eq!(
            parse_spec("@babel/core@7.20.0"),
            ("@babel/core".to_string(), Some("7.20.0".to_string()))
        );
    }
}
