//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! You should not need to think about this module directly. Build a [`Response`]
//! in your handler and return it. That is the entire job description.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use tracing::error;

// ── Body aliases ──────────────────────────────────────────────────────────────

/// Boxed error type carried by response and request bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The body type flowing through the layer.
///
/// A trait object rather than a concrete body so a single [`Response`] type
/// can carry an in-memory page, a relayed backend stream, or nothing at all.
pub type BoxedBody = UnsyncBoxBody<Bytes, BoxError>;

pub(crate) fn empty_body() -> BoxedBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub(crate) fn full_body(bytes: impl Into<Bytes>) -> BoxedBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use shunt::{Response, StatusCode};
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use shunt::{Response, StatusCode};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
///
/// Response::builder()
///     .status(StatusCode::OK)
///     .bytes("application/xml", b"<ok/>".to_vec());
/// ```
pub struct Response {
    inner: http::Response<BoxedBody>,
}

impl Response {
    /// `200 OK` — `application/json`.
    ///
    /// Pass bytes from your serialiser directly — no intermediate allocation:
    /// - serde_json: `serde_json::to_vec(&val)?`
    /// - hand-built: `format!(r#"{{"id":{id}}}"#).into_bytes()`
    pub fn json(body: Vec<u8>) -> Self {
        Self::with_content_type("application/json", body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_content_type("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        let mut inner = http::Response::new(empty_body());
        *inner.status_mut() = code;
        Self { inner }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { inner: http::Response::builder().status(StatusCode::OK) }
    }

    /// The response status.
    pub fn status_code(&self) -> StatusCode {
        self.inner.status()
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn with_content_type(content_type: &'static str, body: Vec<u8>) -> Self {
        let mut inner = http::Response::new(full_body(body));
        inner
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self { inner }
    }

    /// Wraps an already-assembled `http` response, e.g. a relayed backend
    /// response whose status, headers, and body stream must pass through
    /// untouched.
    pub(crate) fn from_http(inner: http::Response<BoxedBody>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_inner(self) -> http::Response<BoxedBody> {
        self.inner
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by a
/// typed body method — you always know what you're sending.
pub struct ResponseBuilder {
    inner: http::response::Builder,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.inner = self.inner.status(code);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with an explicit content type. Use this for HTML, CSS,
    /// binary downloads — anything the shortcuts don't cover.
    pub fn bytes(self, content_type: &str, body: Vec<u8>) -> Response {
        self.finish(content_type, body)
    }

    /// Terminate with no body (e.g. `204 No Content`, `304 Not Modified`).
    pub fn no_body(self) -> Response {
        match self.inner.body(empty_body()) {
            Ok(inner) => Response { inner },
            Err(e) => build_failure(&e),
        }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        match self
            .inner
            .header(CONTENT_TYPE, content_type)
            .body(full_body(body))
        {
            Ok(inner) => Response { inner },
            Err(e) => build_failure(&e),
        }
    }
}

/// A builder only fails when fed an invalid header name or value. The caller
/// gets a 500 rather than a panic on the request path.
fn build_failure(e: &http::Error) -> Response {
    error!("response build failed: {e}");
    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
///
/// # Example — typed `Json<T>` wrapper with serde
///
/// ```rust,ignore
/// use shunt::{IntoResponse, Response, StatusCode};
/// use serde::Serialize;
///
/// struct Json<T: Serialize>(T);
///
/// impl<T: Serialize> IntoResponse for Json<T> {
///     fn into_response(self) -> Response {
///         match serde_json::to_vec(&self.0) {
///             Ok(bytes) => Response::json(bytes),
///             Err(_)    => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
///         }
///     }
/// }
/// ```
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        Response::text(self)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        Response::text(self)
    }
}

/// Return a [`StatusCode`] directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        Response::status(self)
    }
}
