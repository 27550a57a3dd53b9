//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. No middleware stack, no
//! reflection. You register a path, you get a handler. That is all.
//!
//! Two registration styles coexist:
//! - [`Router::on`] — chaining, panics on a bad pattern. For routes written
//!   by hand at startup, where a typo should stop the program.
//! - [`Router::insert`] — fallible and additive. For routes derived from
//!   configuration, where a duplicate is skipped and a malformed pattern is
//!   reported, not thrown.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};

/// The application router.
///
/// One radix tree per HTTP method — O(path-length) lookup, no allocations on
/// the hot path. Build it once at startup; pass it to
/// [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use shunt::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern or is already taken.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        match self.insert_boxed(method, path, handler.into_boxed_handler()) {
            Ok(true) => self,
            Ok(false) => panic!("invalid route `{path}`: already registered"),
            Err(e) => panic!("{e}"),
        }
    }

    /// Register a handler without panicking.
    ///
    /// Returns `Ok(true)` when the route was installed and `Ok(false)` when
    /// the pattern was already taken for that method — the earlier handler
    /// stays, which makes repeated installation of the same route set
    /// harmless. A syntactically invalid pattern is an
    /// [`Error::InvalidRoute`].
    pub fn insert(
        &mut self,
        method: Method,
        path: &str,
        handler: impl Handler,
    ) -> Result<bool, Error> {
        self.insert_boxed(method, path, handler.into_boxed_handler())
    }

    pub(crate) fn insert_boxed(
        &mut self,
        method: Method,
        path: &str,
        handler: BoxedHandler,
    ) -> Result<bool, Error> {
        match self.routes.entry(method).or_default().insert(path, handler) {
            Ok(()) => Ok(true),
            Err(matchit::InsertError::Conflict { .. }) => {
                debug!(route = %path, "route already registered, keeping existing handler");
                Ok(false)
            }
            Err(e) => Err(Error::InvalidRoute {
                pattern: path.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
