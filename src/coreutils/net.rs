//! `fetch`/`curl`: the shell's only direct window onto the network beyond
//! the git/npm façades, both backed by the same `reqwest` client those
//! façades already use rather than a second HTTP stack.

use std::collections::HashMap;

use tracing::debug;

use crate::registry::{CommandContext, CommandOutput, Handler};

pub fn register(handlers: &mut HashMap<&'static str, Handler>) {
    handlers.insert("fetch", |ctx| Box::pin(fetch(ctx)));
    handlers.insert("curl", |ctx| Box::pin(fetch(ctx)));
}

async fn fetch(ctx: CommandContext<'_>) -> CommandOutput {
    let mut method = "GET".to_string();
    let mut url = None;
    let mut body: Option<String> = None;
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut show_headers_only = false;

    let mut args = ctx.args.iter().peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-X" | "--request" => {
                if let Some(m) = args.next() {
                    method = m.to_uppercase();
                }
            }
            "-d" | "--data" => {
                if let Some(d) = args.next() {
                    body = Some(d.clone());
                    if method == "GET" {
                        method = "POST".to_string();
                    }
                }
            }
            "-H" | "--header" => {
                if let Some(h) = args.next() {
                    if let Some((name, value)) = h.split_once(':') {
                        headers.push((name.trim().to_string(), value.trim().to_string()));
                    }
                }
            }
            "-I" | "--head" => show_headers_only = true,
            other if !other.starts_with('-') && url.is_none() => url = Some(other.to_string()),
            _ => {}
        }
    }

    let Some(url) = url else {
        return CommandOutput::err("fetch: missing URL\n".to_string(), 1);
    };

    debug!(url = %url, method = %method, "fetch: sending request");
    let client = reqwest::Client::new();
    let method_parsed = match reqwest::Method::from_bytes(method.as_bytes()) {
        Ok(m) => m,
        Err(_) => return CommandOutput::err(format!("fetch: invalid method '{method}'\n"), 1),
    };
    let mut request = client.request(method_parsed, &url);
    for (name, value) in &headers {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(err) => return CommandOutput::err(format!("fetch: {err}\n"), 1),
    };
    let status = response.status();
    if show_headers_only {
        let mut out = format!("HTTP/1.1 {}\n", status.as_str());
        for (name, value) in response.headers() {
            out.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("")));
        }
        return CommandOutput::ok(out);
    }
    let text = match response.text().await {
        Ok(t) => t,
        Err(err) => return CommandOutput::err(format!("fetch: {err}\n"), 1),
    };
    if status.is_success() {
        CommandOutput::ok(text)
    } else {
        CommandOutput { stdout: text, stderr: format!("fetch: server responded {status}\n"), exit_code: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing_rejects_garbage() {
        assert!(reqwest::Method::from_bytes(b"GET").is_ok());
        assert!(reqwest::Method::from_bytes(b" bad method ").is_err());
    }
}
