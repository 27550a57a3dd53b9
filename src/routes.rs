//! Route registration for prefix-bound handlers.
//!
//! The proxy and static services install one handler under a whole *prefix*
//! — `/1.0/*` means "this handler owns everything at or below `/1.0`". The
//! router's catch-all syntax (`{*rest}`) matches one-or-more trailing
//! segments but not the bare prefix or its trailing-slash form, so a single
//! prefix pattern expands to up to three concrete routes before insertion:
//!
//! ```text
//! "/1.0/*"  →  "/1.0"   "/1.0/"   "/1.0/{*rest}"
//! "/*"      →  "/"      "/{*rest}"
//! "/exact"  →  "/exact"
//! ```
//!
//! Installation is additive and idempotent: a route already present keeps
//! its existing handler and is skipped, so `connect` may run repeatedly as
//! configuration accretes.

use std::fmt;

use http::Method;
use tracing::warn;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::router::Router;

// ── Prefix source ─────────────────────────────────────────────────────────────

/// Where a set of route prefixes comes from.
///
/// Mirrors the three shapes a prefix argument takes at call sites: absent
/// (use the service's configured prefixes), given outright, or produced by a
/// function evaluated once at registration time.
///
/// ```rust
/// use shunt::Prefixes;
///
/// let _ = Prefixes::Default;
/// let _ = Prefixes::from("/2.0/*");
/// let _ = Prefixes::from(vec!["/1.0/*".to_owned(), "/2.0/*".to_owned()]);
/// let _ = Prefixes::computed(|| vec!["/generated/*".to_owned()]);
/// ```
#[derive(Default)]
pub enum Prefixes {
    /// Use the prefixes the service resolved at construction.
    #[default]
    Default,
    /// These exact patterns.
    Literal(Vec<String>),
    /// Ask at registration time. The closure runs exactly once per
    /// registration call.
    Computed(Box<dyn Fn() -> Vec<String> + Send + Sync>),
}

impl Prefixes {
    pub fn computed(f: impl Fn() -> Vec<String> + Send + Sync + 'static) -> Self {
        Self::Computed(Box::new(f))
    }

    /// Collapses the source to a concrete candidate list. `None` means "no
    /// opinion" — the caller falls back to its configured prefixes. A
    /// computed source is evaluated here, once.
    pub(crate) fn into_candidates(self) -> Option<Vec<String>> {
        match self {
            Self::Default => None,
            Self::Literal(list) => Some(list),
            Self::Computed(f) => Some(f()),
        }
    }
}

impl fmt::Debug for Prefixes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Prefixes::Default"),
            Self::Literal(list) => f.debug_tuple("Prefixes::Literal").field(list).finish(),
            Self::Computed(_) => f.write_str("Prefixes::Computed(..)"),
        }
    }
}

impl From<&str> for Prefixes {
    fn from(pattern: &str) -> Self {
        Self::Literal(vec![pattern.to_owned()])
    }
}

impl From<String> for Prefixes {
    fn from(pattern: String) -> Self {
        Self::Literal(vec![pattern])
    }
}

impl From<Vec<String>> for Prefixes {
    fn from(patterns: Vec<String>) -> Self {
        Self::Literal(patterns)
    }
}

impl From<&[&str]> for Prefixes {
    fn from(patterns: &[&str]) -> Self {
        Self::Literal(patterns.iter().map(|p| (*p).to_owned()).collect())
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Installs `handler` under every (method, pattern) pair, expanding
/// trailing-`/*` prefixes as described in the module docs.
///
/// Returns the number of routes actually installed; routes already present
/// are skipped and not counted. A malformed pattern aborts with
/// [`Error::InvalidRoute`] — routes installed before the bad pattern stay in
/// place.
pub fn connect(
    router: &mut Router,
    patterns: &[String],
    methods: &[Method],
    handler: impl Handler,
) -> Result<usize, Error> {
    connect_boxed(router, patterns, methods, handler.into_boxed_handler())
}

pub(crate) fn connect_boxed(
    router: &mut Router,
    patterns: &[String],
    methods: &[Method],
    handler: BoxedHandler,
) -> Result<usize, Error> {
    let mut installed = 0;
    for pattern in patterns {
        for route in expand_prefix(pattern) {
            for method in methods {
                if router.insert_boxed(method.clone(), &route, handler.clone())? {
                    installed += 1;
                }
            }
        }
    }
    Ok(installed)
}

/// Resolves an optional candidate list against a configured fallback.
///
/// An empty candidate list is treated like no list at all — a computed
/// source that came back empty would otherwise silently unregister the
/// service.
pub(crate) fn candidates_or(candidates: Option<Vec<String>>, fallback: &[String]) -> Vec<String> {
    match candidates {
        Some(list) if !list.is_empty() => list,
        Some(_) => {
            warn!("prefix source produced no patterns, using configured prefixes");
            fallback.to_vec()
        }
        None => fallback.to_vec(),
    }
}

/// Expands one prefix pattern into the concrete routes that cover it.
pub(crate) fn expand_prefix(pattern: &str) -> Vec<String> {
    let normalized = if pattern.starts_with('/') {
        pattern.to_owned()
    } else {
        format!("/{pattern}")
    };

    match normalized.strip_suffix("/*") {
        Some("") => vec!["/".to_owned(), "/{*rest}".to_owned()],
        Some(base) => vec![
            base.to_owned(),
            format!("{base}/"),
            format!("{base}/{{*rest}}"),
        ],
        None => vec![normalized],
    }
}
