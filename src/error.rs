//! Unified error type.

use std::fmt;

/// The error type returned by shunt's fallible operations.
///
/// Per-request outcomes (404, 416, a 502 from a dead backend) are expressed
/// as HTTP [`Response`](crate::Response) values, not as `Error`s. This type
/// surfaces failures of the layer itself: binding a port, installing a route,
/// resolving configuration, or reaching a backend at forward time.
///
/// [`Error::Forward`] never escapes a handler — the proxy catches it, logs
/// it, and answers `502 Bad Gateway`. It is public so embedders driving
/// [`Forwarder`](crate::forward::Forwarder) directly can do the same.
#[derive(Debug)]
pub enum Error {
    /// Socket-level failure: bind, accept, or TLS client setup.
    Io(std::io::Error),
    /// A route pattern the router cannot install.
    InvalidRoute { pattern: String, reason: String },
    /// A static route was requested without a root directory to serve from.
    MissingRoot,
    /// Shared settings that failed to parse.
    InvalidSettings(String),
    /// A backend request that could not be completed.
    Forward { url: String, message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::InvalidRoute { pattern, reason } => {
                write!(f, "invalid route `{pattern}`: {reason}")
            }
            Self::MissingRoot => write!(f, "static route requires a root directory"),
            Self::InvalidSettings(reason) => write!(f, "invalid settings: {reason}"),
            Self::Forward { url, message } => write!(f, "forwarding {url}: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
