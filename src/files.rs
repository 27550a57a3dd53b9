//! The serving primitive: async filesystem byte-serving.
//!
//! [`serve`] resolves a request path inside a root directory and finalises
//! every outcome itself — `200`/`206` with content, `304` on a matched
//! `if-none-match`, `416` for an unsatisfiable range, and a uniform `404`
//! for everything that is not a readable file inside the root. Callers never
//! see an error; there is nothing left to handle after it returns.
//!
//! Containment is canonical-path based: whatever the request path decodes
//! to, the resolved file must live under the canonicalised root or the
//! answer is `404`. Dotfiles are withheld unless
//! [`ServeOptions::serve_hidden`] says otherwise.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use http::{Method, StatusCode};
use tokio::fs;
use tracing::{debug, error, warn};

use crate::config;
use crate::request::Request;
use crate::response::{Response, ResponseBuilder};

// ── Options ───────────────────────────────────────────────────────────────────

/// Per-route serving parameters, passed through to [`serve`] on every
/// request.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// File served when the path resolves to a directory.
    pub index: String,
    /// Compute a content ETag and honour `if-none-match`.
    pub etag: bool,
    /// `cache-control` value attached to successful responses.
    pub cache_control: Option<String>,
    /// Serve files and directories whose name starts with a dot.
    pub serve_hidden: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            index: config::DEFAULT_INDEX.to_owned(),
            etag: true,
            cache_control: None,
            serve_hidden: false,
        }
    }
}

// ── Serving ───────────────────────────────────────────────────────────────────

/// Serves `path` (percent-encoded, relative to `root`) for `req`.
///
/// Directory paths — including the empty path and anything with a trailing
/// slash — fall back to the configured index file. Conditional and range
/// headers are honoured; `HEAD` gets full headers and an empty body.
///
/// Takes the request by value: handler futures must be `Send`, and a
/// borrow of the body-owning request is not.
pub async fn serve(root: &Path, path: &str, req: Request, options: &ServeOptions) -> Response {
    let Ok(decoded) = urlencoding::decode(path) else {
        return not_found();
    };
    if decoded.contains('\0') || decoded.split('/').any(|segment| segment == "..") {
        debug!(path, "refusing path with traversal segments");
        return not_found();
    }

    let relative = decoded.trim_start_matches('/');
    if !options.serve_hidden && relative.split('/').any(|segment| segment.starts_with('.')) {
        return not_found();
    }

    let mut file_path = root.join(relative);
    if relative.is_empty() || decoded.ends_with('/') || file_path.is_dir() {
        file_path = file_path.join(&options.index);
    }

    let root_real = match root.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            warn!(root = %root.display(), "root directory unavailable: {e}");
            return not_found();
        }
    };
    // Missing files are the ordinary 404, not worth a log line.
    let Ok(file_real) = file_path.canonicalize() else {
        return not_found();
    };
    if !file_real.starts_with(&root_real) {
        warn!(path, target = %file_real.display(), "resolved path escapes the root");
        return not_found();
    }

    let content = match fs::read(&file_real).await {
        Ok(c) => c,
        Err(e) => {
            error!(file = %file_real.display(), "read failed: {e}");
            return not_found();
        }
    };

    let mime = mime_guess::from_path(&file_real).first_or_octet_stream();
    respond(content, mime.as_ref(), &req, options)
}

fn respond(content: Vec<u8>, content_type: &str, req: &Request, options: &ServeOptions) -> Response {
    let head_only = req.method() == Method::HEAD;
    let total = content.len();
    let etag = options.etag.then(|| content_etag(&content));

    if let Some(tag) = &etag {
        if etag_matches(req.header("if-none-match"), tag) {
            let mut builder = Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header("etag", tag);
            if let Some(cc) = &options.cache_control {
                builder = builder.header("cache-control", cc);
            }
            return builder.no_body();
        }
    }

    match parse_range(req.header("range"), total) {
        ByteRange::Satisfiable { start, end } => {
            let builder = with_cache_headers(
                Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header("content-range", &format!("bytes {start}-{end}/{total}"))
                    .header("content-length", &(end - start + 1).to_string())
                    .header("accept-ranges", "bytes"),
                etag.as_deref(),
                options,
            );
            if head_only {
                builder.bytes(content_type, Vec::new())
            } else {
                builder.bytes(content_type, content[start..=end].to_vec())
            }
        }
        ByteRange::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header("content-range", &format!("bytes */{total}"))
            .no_body(),
        ByteRange::Absent => {
            let builder = with_cache_headers(
                Response::builder()
                    .header("content-length", &total.to_string())
                    .header("accept-ranges", "bytes"),
                etag.as_deref(),
                options,
            );
            if head_only {
                builder.bytes(content_type, Vec::new())
            } else {
                builder.bytes(content_type, content)
            }
        }
    }
}

fn with_cache_headers(
    mut builder: ResponseBuilder,
    etag: Option<&str>,
    options: &ServeOptions,
) -> ResponseBuilder {
    if let Some(tag) = etag {
        builder = builder.header("etag", tag);
    }
    if let Some(cc) = &options.cache_control {
        builder = builder.header("cache-control", cc);
    }
    builder
}

fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .text("Not Found")
}

// ── Conditional requests ──────────────────────────────────────────────────────

fn content_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// `if-none-match` may carry a comma-separated list or the `*` wildcard.
fn etag_matches(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match
        .is_some_and(|list| list.split(',').any(|e| e.trim() == etag || e.trim() == "*"))
}

// ── Range requests ────────────────────────────────────────────────────────────

/// Outcome of parsing a `range` header against a known content length.
#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    /// Inclusive byte positions to slice out, answered with `206`.
    Satisfiable { start: usize, end: usize },
    /// Syntactically fine but outside the content, answered with `416`.
    Unsatisfiable,
    /// No header, a malformed one, or a multi-range request — all answered
    /// with the full content.
    Absent,
}

fn parse_range(header: Option<&str>, len: usize) -> ByteRange {
    let Some(spec) = header.and_then(|h| h.strip_prefix("bytes=")) else {
        return ByteRange::Absent;
    };
    if spec.contains(',') {
        return ByteRange::Absent;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return ByteRange::Absent;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    // Suffix form: the last N bytes.
    if start_str.is_empty() {
        let Ok(suffix) = end_str.parse::<usize>() else {
            return ByteRange::Absent;
        };
        if suffix == 0 || len == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Satisfiable {
            start: len.saturating_sub(suffix),
            end: len - 1,
        };
    }

    let Ok(start) = start_str.parse::<usize>() else {
        return ByteRange::Absent;
    };
    if start >= len {
        return ByteRange::Unsatisfiable;
    }
    let end = if end_str.is_empty() {
        len - 1
    } else {
        match end_str.parse::<usize>() {
            Ok(end) if end >= start => end.min(len - 1),
            Ok(_) => return ByteRange::Absent,
            Err(_) => return ByteRange::Absent,
        }
    };
    ByteRange::Satisfiable { start, end }
}
