//! Smart-HTTP transport for `git clone`/`git fetch`, run from inside a
//! browser tab with no raw TCP access — every request goes out through
//! `reqwest` over HTTPS, optionally prefixed with a CORS relay the caller's
//! `FoamConfig` names, exactly the way the façade's other network-facing
//! commands (npm's registry fetch, coreutils' `fetch`) route through
//! `reqwest` rather than reaching for a lower-level socket crate.

use tracing::{debug, info, warn};

use super::repo::GitError;

/// A ref advertised by `info/refs`: `oid` and the ref name (`HEAD`,
/// `refs/heads/main`, ...).
#[derive(Debug, Clone)]
pub struct RemoteRef {
    pub name: String,
    pub oid: String,
}

pub struct UploadPackResponse {
    pub refs: Vec<RemoteRef>,
    pub head_oid: Option<String>,
}

fn relay_url(cors_relay: Option<&str>, target: &str) -> String {
    match cors_relay {
        Some(relay) if !relay.is_empty() => format!("{}{}", relay.trim_end_matches('/'), target),
        _ => target.to_string(),
    }
}

/// `GET {remote}/info/refs?service=git-upload-pack`, parsed as pkt-lines.
pub async fn discover_refs(remote: &str, cors_relay: Option<&str>) -> Result<Vec<RemoteRef>, GitError> {
    let target = format!("{}/info/refs?service=git-upload-pack", remote.trim_end_matches('/'));
    let url = relay_url(cors_relay, &target);
    debug!(url = %url, "git: discovering refs");
    let client = reqwest::Client::new();
    let resp = client
        .get(&url)
        .header("Accept", "application/x-git-upload-pack-advertisement")
        .send()
        .await
        .map_err(|e| GitError::RemoteFetch(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(GitError::RemoteFetch(format!("info/refs returned {}", resp.status())));
    }
    let body = resp.bytes().await.map_err(|e| GitError::RemoteFetch(e.to_string()))?;
    parse_refs_advertisement(&body)
}

fn parse_refs_advertisement(body: &[u8]) -> Result<Vec<RemoteRef>, GitError> {
    let mut refs = Vec::new();
    let mut pos = 0;
    let mut seen_first = false;
    while let Some((line, next)) = read_pkt_line(body, pos) {
        pos = next;
        let Some(line) = line else { continue }; // flush pkt ("0000")
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches('\n');
        if text.starts_with('#') {
            continue; // service announcement line
        }
        let text = if !seen_first {
            seen_first = true;
            // the first ref line carries a NUL-separated capabilities list
            text.split('\0').next().unwrap_or(text)
        } else {
            text
        };
        let mut parts = text.splitn(2, ' ');
        let oid = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if oid.len() == 40 && !name.is_empty() {
            refs.push(RemoteRef { name: name.to_string(), oid: oid.to_string() });
        }
    }
    Ok(refs)
}

/// `POST {remote}/git-upload-pack` requesting a shallow (depth 1) fetch of
/// `wanted_oid`, returning the raw packfile bytes (pkt-line framing and the
/// `NAK`/progress sideband already stripped).
pub async fn fetch_pack(remote: &str, cors_relay: Option<&str>, wanted_oid: &str) -> Result<Vec<u8>, GitError> {
    let target = format!("{}/git-upload-pack", remote.trim_end_matches('/'));
    let url = relay_url(cors_relay, &target);
    let mut request = Vec::new();
    write_pkt_line(&mut request, format!("want {wanted_oid} multi_ack_detailed no-done side-band-64k\n").as_bytes());
    request.extend_from_slice(b"0000");
    write_pkt_line(&mut request, b"deepen 1\n");
    request.extend_from_slice(b"0000");
    write_pkt_line(&mut request, b"done\n");

    info!(remote, oid = wanted_oid, "git: fetching pack");
    let client = reqwest::Client::new();
    let resp = client
        .post(&url)
        .header("Content-Type", "application/x-git-upload-pack-request")
        .header("Accept", "application/x-git-upload-pack-result")
        .body(request)
        .send()
        .await
        .map_err(|e| GitError::RemoteFetch(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(GitError::RemoteFetch(format!("git-upload-pack returned {}", resp.status())));
    }
    let body = resp.bytes().await.map_err(|e| GitError::RemoteFetch(e.to_string()))?;
    extract_pack_from_sideband(&body)
}

/// Strip the pkt-line/sideband framing `git-upload-pack`'s response wraps
/// the packfile in, keeping only sideband 1 (pack data) payloads and the
/// bare `PACK` bytes some servers send unframed for a non-sideband request.
fn extract_pack_from_sideband(body: &[u8]) -> Result<Vec<u8>, GitError> {
    if let Some(idx) = find_subsequence(body, b"PACK") {
        // Servers that skip the sideband entirely (or ones whose sideband
        // prefix we've already walked past) still leave `PACK...` intact.
        if idx == 0 {
            return Ok(body.to_vec());
        }
    }
    let mut pos = 0;
    let mut out = Vec::new();
    let mut seen_pack = false;
    while let Some((line, next)) = read_pkt_line(body, pos) {
        pos = next;
        let Some(line) = line else { continue };
        if line.is_empty() {
            continue;
        }
        match line[0] {
            1 => out.extend_from_slice(&line[1..]), // pack data band
            2 => {
                let text = String::from_utf8_lossy(&line[1..]);
                debug!(progress = %text.trim_end(), "git: remote progress");
            }
            3 => {
                let text = String::from_utf8_lossy(&line[1..]);
                warn!(error = %text.trim_end(), "git: remote reported fatal error");
                return Err(GitError::RemoteFetch(text.trim_end().to_string()));
            }
            _ => out.extend_from_slice(&line),
        }
        if out.starts_with(b"PACK") {
            seen_pack = true;
        }
    }
    if !seen_pack && !out.starts_with(b"PACK") {
        return Err(GitError::RemoteFetch("server response did not contain a packfile".to_string()));
    }
    Ok(out)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one pkt-line at `pos`. Returns `(None, next)` for a flush pkt
/// (`"0000"`), `(Some(payload), next)` otherwise, or `None` at end of input.
fn read_pkt_line(data: &[u8], pos: usize) -> Option<(Option<Vec<u8>>, usize)> {
    if pos + 4 > data.len() {
        return None;
    }
    let len_hex = std::str::from_utf8(&data[pos..pos + 4]).ok()?;
    let len = usize::from_str_radix(len_hex, 16).ok()?;
    if len == 0 {
        return Some((None, pos + 4));
    }
    if len < 4 || pos + len > data.len() {
        return None;
    }
    Some((Some(data[pos + 4..pos + len].to_vec()), pos + len))
}

fn write_pkt_line(out: &mut Vec<u8>, payload: &[u8]) {
    let len = payload.len() + 4;
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkt_line_round_trips() {
        let mut buf = Vec::new();
        write_pkt_line(&mut buf, b"hello\n");
        let (payload, next) = read_pkt_line(&buf, 0).unwrap();
        assert_eq!(payload.unwrap(), b"hello\n");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn flush_pkt_is_none_payload() {
        let (payload, next) = read_pkt_line(b"0000", 0).unwrap();
        assert!(payload.is_none());
        assert_eq!(next, 4);
    }

    #[test]
    fn parses_refs_advertisement_with_capabilities() {
        let mut body = Vec::new();
        write_pkt_line(&mut body, b"# service=git-upload-pack\n");
        body.extend_from_slice(b"0000");
        write_pkt_line(&mut body, format!("{} HEAD\0multi_ack\n", "a".repeat(40)).as_bytes());
        write_pkt_line(&mut body, format!("{} refs/heads/main\n", "b".repeat(40)).as_bytes());
        body.extend_from_slice(b"0000");
        let refs = parse_refs_advertisement(&body).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "HEAD");
        assert_eq!(refs[1].name, "refs/heads/main");
    }
}
