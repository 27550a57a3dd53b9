//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};
use http_body_util::BodyExt;

use crate::error::Error;
use crate::response::{BoxError, BoxedBody};

/// An incoming HTTP request.
///
/// Wraps the parsed head, a boxed body stream, the route parameters captured
/// by the router, and the two socket endpoints of the connection it arrived
/// on. Handlers receive it by value and may consume the body exactly once.
pub struct Request {
    parts: http::request::Parts,
    body: BoxedBody,
    params: HashMap<String, String>,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        params: HashMap<String, String>,
        peer_addr: Option<SocketAddr>,
        local_addr: Option<SocketAddr>,
    ) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            parts,
            body: body.map_err(|e| Box::new(e) as BoxError).boxed_unsync(),
            params,
            peer_addr,
            local_addr,
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// The raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The host the client addressed, from the `host` header or, on HTTP/2,
    /// the `:authority` pseudo-header. May carry a port.
    pub fn host(&self) -> Option<&str> {
        self.header("host")
            .or_else(|| self.parts.uri.authority().map(|a| a.as_str()))
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The client's socket address.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// The server-side socket address the connection landed on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Collects the whole body into memory. Consumes the request.
    pub async fn body_bytes(self) -> Result<Bytes, Error> {
        let collected = self
            .body
            .collect()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(collected.to_bytes())
    }

    /// Splits the request into its head and body stream for relaying.
    pub fn into_parts(self) -> (http::request::Parts, BoxedBody) {
        (self.parts, self.body)
    }
}

#[cfg(test)]
impl Request {
    /// Assembles a request out of thin air. Test-only: live requests always
    /// come off a connection via `from_hyper`.
    pub(crate) fn fake(method: Method, uri: &str, headers: &[(&str, &str)]) -> Self {
        Self::fake_with_body(method, uri, headers, Bytes::new())
    }

    pub(crate) fn fake_with_body(
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> Self {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Self {
            parts,
            body: crate::response::full_body(body),
            params: HashMap::new(),
            peer_addr: None,
            local_addr: None,
        }
    }
}
