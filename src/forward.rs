//! The forwarding primitive.
//!
//! A [`Forwarder`] is a long-lived HTTP client that relays one request to a
//! backend origin and hands back whatever the backend answered — status,
//! headers, and a streamed body. Each forwarder owns its own connection
//! pool, so two proxy services talking to two backends never share sockets.
//!
//! What a relay preserves and what it does not:
//!
//! - Method, path, and query pass through untouched.
//! - End-to-end headers pass through; hop-by-hop headers (and anything named
//!   in `connection`) are dropped on both legs, and body framing is
//!   recomputed rather than copied.
//! - Redirects are not followed — a `3xx` from the backend goes to the
//!   client as-is.
//! - No request timeout is imposed. A hung backend holds exactly one
//!   request task hostage, nothing else.

use futures_util::TryStreamExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use hyper::body::{Body, Frame};
use reqwest::redirect;
use tracing::{error, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::{BoxError, Response};

// ── Options ───────────────────────────────────────────────────────────────────

/// Knobs applied to every request a [`Forwarder`] sends.
///
/// The backend URL is deliberately *not* among them — it is a parameter of
/// [`Forwarder::forward`], so no option merge can drop or override it.
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Verify the backend's TLS certificate on `https` destinations.
    ///
    /// Off by default: the expected deployment forwards to sibling services
    /// whose certificates are self-signed or absent. Switch it on when the
    /// backend presents a real certificate.
    pub secure: bool,
    /// Rewrite the `host` header to the destination's authority. When off,
    /// the client's original `host` is preserved.
    pub change_origin: bool,
    /// Append `x-forwarded-for`, `x-forwarded-proto`, and
    /// `x-forwarded-host` describing the client-side connection.
    pub x_forwarded: bool,
    /// Extra headers set on every outbound request, after everything else.
    pub headers: Vec<(String, String)>,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            secure: false,
            change_origin: false,
            x_forwarded: false,
            headers: Vec::new(),
        }
    }
}

// ── Forwarder ─────────────────────────────────────────────────────────────────

/// A pooled HTTP client that relays requests to backend origins.
pub struct Forwarder {
    client: reqwest::Client,
    options: ForwardOptions,
}

impl Forwarder {
    /// Builds the underlying client. Fails only when the TLS backend cannot
    /// be initialised.
    pub fn new(options: ForwardOptions) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!options.secure)
            .redirect(redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(Self { client, options })
    }

    /// Relays `req` to `destination`, returning the backend's response.
    ///
    /// `destination` is an absolute `http`/`https` URL; the request's own
    /// path and query are appended to it. On failure the returned
    /// [`Error::Forward`] carries the request target and the underlying
    /// message — the caller decides how to answer the client.
    pub async fn forward(&self, destination: &str, req: Request) -> Result<Response, Error> {
        let peer_ip = req.peer_addr().map(|a| a.ip().to_string());
        let (parts, body) = req.into_parts();

        let url = target_url(destination, &parts.uri);
        let headers = outbound_headers(&parts.headers, &self.options, peer_ip.as_deref());

        let mut outbound = self.client.request(parts.method, url).headers(headers);
        // Whether a body is coming is the stream's call, not the headers':
        // an HTTP/2 request may carry one with neither `content-length` nor
        // `transfer-encoding`.
        if !body.is_end_stream() {
            let stream = BodyStream::new(body)
                .try_filter_map(|frame| std::future::ready(Ok(frame.into_data().ok())));
            outbound = outbound.body(reqwest::Body::wrap_stream(stream));
        }

        let upstream = outbound.send().await.map_err(|e| Error::Forward {
            url: request_target(&parts.uri),
            message: e.to_string(),
        })?;
        Ok(relay(upstream))
    }
}

/// The path + query of the incoming request, the way it is reported in logs
/// and error bodies.
pub(crate) fn request_target(uri: &Uri) -> String {
    uri.path_and_query().map_or("/", |pq| pq.as_str()).to_owned()
}

fn target_url(destination: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("{}{}", destination.trim_end_matches('/'), path_and_query)
}

// ── Header handling ───────────────────────────────────────────────────────────

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Header names listed in `connection` are hop-by-hop for this hop too.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn outbound_headers(
    incoming: &HeaderMap,
    options: &ForwardOptions,
    peer_ip: Option<&str>,
) -> HeaderMap {
    let named_hop_by_hop = connection_tokens(incoming);
    let mut out = HeaderMap::with_capacity(incoming.len());

    for (name, value) in incoming {
        if is_hop_by_hop(name) || named_hop_by_hop.iter().any(|t| t == name.as_str()) {
            continue;
        }
        // Body framing is recomputed for the outbound leg.
        if name == header::CONTENT_LENGTH {
            continue;
        }
        // With change_origin the client sets host from the destination URL.
        if name == header::HOST && options.change_origin {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    if options.x_forwarded {
        if let Some(ip) = peer_ip {
            let chain = match incoming.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip.to_owned(),
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                out.insert("x-forwarded-for", value);
            }
        }
        out.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        if let Some(host) = incoming.get(header::HOST) {
            out.insert("x-forwarded-host", host.clone());
        }
    }

    for (name, value) in &options.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                out.insert(n, v);
            }
            _ => warn!(header = %name, "skipping invalid extra forward header"),
        }
    }

    out
}

// ── Response relay ────────────────────────────────────────────────────────────

fn relay(upstream: reqwest::Response) -> Response {
    let named_hop_by_hop = connection_tokens(upstream.headers());
    let mut builder = http::Response::builder().status(upstream.status());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name) || named_hop_by_hop.iter().any(|t| t == name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
    }

    let stream = upstream
        .bytes_stream()
        .map_ok(Frame::data)
        .map_err(|e| Box::new(e) as BoxError);

    match builder.body(StreamBody::new(stream).boxed_unsync()) {
        Ok(resp) => Response::from_http(resp),
        Err(e) => {
            error!("relayed response could not be assembled: {e}");
            Response::status(StatusCode::BAD_GATEWAY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_appends_path_and_query() {
        let uri: Uri = "/1.0/items?tag=a".parse().unwrap();
        assert_eq!(
            target_url("http://127.0.0.1/", &uri),
            "http://127.0.0.1/1.0/items?tag=a"
        );
        assert_eq!(
            target_url("http://backend:9000/base/", &uri),
            "http://backend:9000/base/1.0/items?tag=a"
        );
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut incoming = HeaderMap::new();
        incoming.insert("connection", HeaderValue::from_static("close, x-session"));
        incoming.insert("x-session", HeaderValue::from_static("s1"));
        incoming.insert("te", HeaderValue::from_static("trailers"));
        incoming.insert("upgrade", HeaderValue::from_static("h2c"));
        incoming.insert("x-kept", HeaderValue::from_static("yes"));
        incoming.insert("content-length", HeaderValue::from_static("12"));

        let out = outbound_headers(&incoming, &ForwardOptions::default(), None);
        assert_eq!(out.get("x-kept").unwrap(), "yes");
        assert!(out.get("connection").is_none());
        assert!(out.get("x-session").is_none());
        assert!(out.get("te").is_none());
        assert!(out.get("upgrade").is_none());
        assert!(out.get("content-length").is_none());
    }

    #[test]
    fn host_is_preserved_unless_origin_changes() {
        let mut incoming = HeaderMap::new();
        incoming.insert("host", HeaderValue::from_static("edge.example.test"));

        let kept = outbound_headers(&incoming, &ForwardOptions::default(), None);
        assert_eq!(kept.get("host").unwrap(), "edge.example.test");

        let rewritten = outbound_headers(
            &incoming,
            &ForwardOptions { change_origin: true, ..Default::default() },
            None,
        );
        assert!(rewritten.get("host").is_none());
    }

    #[test]
    fn x_forwarded_chain_appends_peer() {
        let mut incoming = HeaderMap::new();
        incoming.insert("host", HeaderValue::from_static("edge.example.test"));
        incoming.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9"));

        let options = ForwardOptions { x_forwarded: true, ..Default::default() };
        let out = outbound_headers(&incoming, &options, Some("192.168.1.4"));

        assert_eq!(out.get("x-forwarded-for").unwrap(), "10.0.0.9, 192.168.1.4");
        assert_eq!(out.get("x-forwarded-proto").unwrap(), "http");
        assert_eq!(out.get("x-forwarded-host").unwrap(), "edge.example.test");
    }

    #[test]
    fn extra_headers_apply_last() {
        let mut incoming = HeaderMap::new();
        incoming.insert("x-tier", HeaderValue::from_static("edge"));

        let options = ForwardOptions {
            headers: vec![("x-tier".to_owned(), "origin".to_owned())],
            ..Default::default()
        };
        let out = outbound_headers(&incoming, &options, None);
        assert_eq!(out.get("x-tier").unwrap(), "origin");
    }

    #[test]
    fn certificate_checks_default_off() {
        assert!(!ForwardOptions::default().secure);
    }
}
