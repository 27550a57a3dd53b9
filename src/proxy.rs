//! The proxying component.
//!
//! A [`ProxyService`] resolves its configuration once at construction —
//! explicit options first, then shared [`Settings`], then built-in defaults —
//! and holds a single pooled [`Forwarder`] for its whole lifetime. Connecting
//! it to a [`Router`] installs forwarding handlers for `GET`, `PUT`, `POST`
//! and `DELETE` under each configured prefix; connecting twice is a no-op,
//! and two services on one router stay fully independent.
//!
//! A failed relay never unwinds into the server: the handler logs the
//! failure and answers `502` with a small JSON body naming the error and the
//! path that triggered it.

use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{error, info, warn};

use crate::config::{self, Settings};
use crate::error::Error;
use crate::forward::{self, ForwardOptions, Forwarder};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::routes::{self, Prefixes};

/// The verbs a proxy route answers.
const PROXY_METHODS: &[Method] = &[Method::GET, Method::PUT, Method::POST, Method::DELETE];

// ── Configuration ─────────────────────────────────────────────────────────────

/// Construction-time knobs. Every field is optional; whatever is left unset
/// resolves from [`Settings`] and then from the built-in defaults.
#[derive(Debug, Default)]
pub struct ProxyOptions {
    /// Origin to forward to, e.g. `http://127.0.0.1:4000`.
    pub destination_url: Option<String>,
    /// Prefix patterns to mount handlers under.
    pub request_prefixes: Prefixes,
    /// `0` silences per-request logging. An explicit `0` wins over settings.
    pub log_level: Option<u8>,
    /// Forwarding behaviour, passed through to [`Forwarder::new`].
    pub forward: ForwardOptions,
}

/// The resolved configuration a service runs with.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub destination_url: String,
    pub request_prefixes: Vec<String>,
    pub log_level: u8,
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Installs forwarding handlers and relays matched requests to a backend.
pub struct ProxyService {
    config: Arc<ProxyConfig>,
    forwarder: Arc<Forwarder>,
}

impl ProxyService {
    /// Resolves `options` against `settings` and builds the forwarding
    /// client. Fails only if the client cannot be initialised.
    pub fn new(options: ProxyOptions, settings: &Settings) -> Result<Self, Error> {
        let ProxyOptions { destination_url, request_prefixes, log_level, forward } = options;
        let shared = &settings.proxy;
        let config = ProxyConfig {
            destination_url: config::resolve_destination(
                destination_url.as_deref(),
                shared.destination_url.as_deref(),
            ),
            request_prefixes: config::resolve_prefixes(
                request_prefixes.into_candidates(),
                shared.request_prefixes.as_deref(),
            ),
            log_level: config::resolve_log_level(log_level, shared.log_level),
        };
        let forwarder = Forwarder::new(forward)?;
        Ok(Self {
            config: Arc::new(config),
            forwarder: Arc::new(forwarder),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Installs this service's handlers under its configured prefixes.
    ///
    /// Returns how many routes were newly added. Routes already present on
    /// the router are left untouched, so calling this twice is harmless.
    pub fn connect_routes(&self, router: &mut Router) -> Result<usize, Error> {
        self.connect_routes_with(router, Prefixes::Default, None)
    }

    /// Like [`connect_routes`](Self::connect_routes), but with per-call
    /// overrides: `prefixes` replaces the configured patterns for this
    /// connection only, and `destination_url` (when valid) redirects these
    /// routes to a different origin while sharing the same client pool.
    pub fn connect_routes_with(
        &self,
        router: &mut Router,
        prefixes: Prefixes,
        destination_url: Option<&str>,
    ) -> Result<usize, Error> {
        let destination = match destination_url {
            Some(url) if config::valid_destination(url) => url.to_owned(),
            Some(url) => {
                warn!(url, "ignoring invalid destination override");
                self.config.destination_url.clone()
            }
            None => self.config.destination_url.clone(),
        };
        let patterns =
            routes::candidates_or(prefixes.into_candidates(), &self.config.request_prefixes);

        let forwarder = Arc::clone(&self.forwarder);
        let log_level = self.config.log_level;
        let handler = move |req: Request| {
            let forwarder = Arc::clone(&forwarder);
            let destination = destination.clone();
            async move { forward_request(&forwarder, &destination, log_level, req).await }
        };
        routes::connect(router, &patterns, PROXY_METHODS, handler)
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

async fn forward_request(
    forwarder: &Forwarder,
    destination: &str,
    log_level: u8,
    req: Request,
) -> Response {
    if log_level > 0 {
        info!(path = req.path(), destination, "proxying request");
    }
    let target = forward::request_target(req.uri());
    match forwarder.forward(destination, req).await {
        Ok(resp) => resp,
        Err(e) => proxy_failure(&target, &e),
    }
}

/// The client still deserves an answer when the backend is unreachable.
fn proxy_failure(target: &str, error: &Error) -> Response {
    let message = match error {
        Error::Forward { message, .. } => message.clone(),
        other => other.to_string(),
    };
    error!(path = target, "proxy request failed: {message}");
    let body = serde_json::json!({ "error": message, "url": target });
    match serde_json::to_vec(&body) {
        Ok(bytes) => Response::builder().status(StatusCode::BAD_GATEWAY).json(bytes),
        Err(_) => Response::builder().status(StatusCode::BAD_GATEWAY).text(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_prefers_explicit_over_settings() {
        let mut settings = Settings::default();
        settings.proxy.destination_url = Some("http://settings.example:9000".into());
        settings.proxy.request_prefixes = Some(vec!["/settings/*".into()]);
        settings.proxy.log_level = Some(2);

        let service = ProxyService::new(
            ProxyOptions {
                destination_url: Some("http://explicit.example:8080".into()),
                request_prefixes: Prefixes::from("/explicit/*"),
                log_level: Some(0),
                ..Default::default()
            },
            &settings,
        )
        .unwrap();

        let config = service.config();
        assert_eq!(config.destination_url, "http://explicit.example:8080");
        assert_eq!(config.request_prefixes, vec!["/explicit/*".to_owned()]);
        assert_eq!(config.log_level, 0, "explicit zero must override settings");
    }

    #[test]
    fn resolution_falls_back_through_the_tiers() {
        let service = ProxyService::new(ProxyOptions::default(), &Settings::default()).unwrap();
        let config = service.config();
        assert_eq!(config.destination_url, "http://127.0.0.1/");
        assert_eq!(config.request_prefixes, vec!["/1.0/*".to_owned()]);
        assert_eq!(config.log_level, 0);
    }

    #[test]
    fn invalid_explicit_destination_falls_to_settings() {
        let mut settings = Settings::default();
        settings.proxy.destination_url = Some("http://settings.example/".into());
        let service = ProxyService::new(
            ProxyOptions {
                destination_url: Some("not a url".into()),
                ..Default::default()
            },
            &settings,
        )
        .unwrap();
        assert_eq!(service.config().destination_url, "http://settings.example/");
    }

    #[test]
    fn connect_installs_all_verbs_and_is_idempotent() {
        let service = ProxyService::new(ProxyOptions::default(), &Settings::default()).unwrap();
        let mut router = Router::new();
        // "/1.0/*" expands to three patterns, each installed for four verbs.
        assert_eq!(service.connect_routes(&mut router).unwrap(), 12);
        assert_eq!(service.connect_routes(&mut router).unwrap(), 0);
        assert!(router.lookup(&Method::GET, "/1.0/things").is_some());
        assert!(router.lookup(&Method::DELETE, "/1.0").is_some());
        assert!(router.lookup(&Method::PATCH, "/1.0/things").is_none());
    }

    #[test]
    fn connect_with_overrides_mounts_elsewhere() {
        let service = ProxyService::new(ProxyOptions::default(), &Settings::default()).unwrap();
        let mut router = Router::new();
        let installed = service
            .connect_routes_with(&mut router, Prefixes::from("/alt/*"), Some("http://other.example/"))
            .unwrap();
        assert_eq!(installed, 12);
        assert!(router.lookup(&Method::GET, "/alt/x").is_some());
        assert!(router.lookup(&Method::GET, "/1.0/x").is_none());
    }

    // ── End to end ────────────────────────────────────────────────────────────

    use bytes::Bytes;
    use crate::server::Server;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio::net::TcpListener;

    /// A backend that answers every proxied verb with a JSON echo of what it
    /// received, tagged so tests can tell backends apart.
    async fn spawn_echo_backend(via: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut app = Router::new();
        let echo = move |req: Request| async move {
            let method = req.method().as_str().to_owned();
            let target = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_owned())
                .unwrap_or_default();
            let body_len = req.body_bytes().await.map(|b| b.len()).unwrap_or(0);
            let body = serde_json::json!({
                "method": method,
                "target": target,
                "body_len": body_len,
                "via": via,
            });
            Response::builder()
                .header("x-backend", via)
                .json(serde_json::to_vec(&body).unwrap())
        };
        routes::connect(&mut app, &["/*".to_owned()], PROXY_METHODS, echo).unwrap();
        tokio::spawn(Server::serve_on(listener, app));
        format!("http://{addr}/")
    }

    async fn spawn_app(build: impl FnOnce(&mut Router)) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut app = Router::new();
        build(&mut app);
        tokio::spawn(Server::serve_on(listener, app));
        format!("http://{addr}")
    }

    fn test_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn relays_verbs_bodies_and_headers() {
        let backend = spawn_echo_backend("echo").await;
        let app = spawn_app(|router| {
            let service = ProxyService::new(
                ProxyOptions {
                    destination_url: Some(backend.clone()),
                    ..Default::default()
                },
                &Settings::default(),
            )
            .unwrap();
            service.connect_routes(router).unwrap();
        })
        .await;
        let client = test_client();

        let resp = client
            .put(format!("{app}/1.0/things?tag=a"))
            .body("hello")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-backend"], "echo");
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["method"], "PUT");
        assert_eq!(v["target"], "/1.0/things?tag=a");
        assert_eq!(v["body_len"], 5);

        let v: Value = client
            .post(format!("{app}/1.0/things"))
            .body("abc")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["method"], "POST");
        assert_eq!(v["body_len"], 3);

        let v: Value = client
            .delete(format!("{app}/1.0/things"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["method"], "DELETE");
        assert_eq!(v["body_len"], 0);

        // Paths outside the prefix never reach the backend.
        let resp = client.get(format!("{app}/2.0/x")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn relays_bodies_framed_only_by_the_stream() {
        let backend = spawn_echo_backend("stream").await;
        let forwarder = Forwarder::new(ForwardOptions::default()).unwrap();

        // No `content-length`, no `transfer-encoding` — the way an HTTP/2
        // request announces its body.
        let req = Request::fake_with_body(
            Method::POST,
            "/1.0/things",
            &[],
            Bytes::from_static(b"payload"),
        );
        let resp = forwarder.forward(&backend, req).await.unwrap();
        assert_eq!(resp.status_code(), StatusCode::OK);

        let bytes = resp.into_inner().into_body().collect().await.unwrap().to_bytes();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["method"], "POST");
        assert_eq!(v["body_len"], 7);
    }

    #[tokio::test]
    async fn unreachable_backend_answers_502_json() {
        // Bind-then-drop guarantees nobody is listening on the port.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let dead = format!("http://127.0.0.1:{port}/");
        let app = spawn_app(|router| {
            let service = ProxyService::new(
                ProxyOptions {
                    destination_url: Some(dead.clone()),
                    ..Default::default()
                },
                &Settings::default(),
            )
            .unwrap();
            service.connect_routes(router).unwrap();
        })
        .await;

        let client = test_client();
        let resp = client.get(format!("{app}/1.0/x")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.headers()["content-type"], "application/json");
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["url"], "/1.0/x");
        assert!(!v["error"].as_str().unwrap().is_empty());

        // The failure stays inside that one request; the server is still up.
        let resp = client.get(format!("{app}/1.0/again")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn two_services_keep_their_own_destinations() {
        let backend_a = spawn_echo_backend("a").await;
        let backend_b = spawn_echo_backend("b").await;
        let app = spawn_app(|router| {
            let service = ProxyService::new(
                ProxyOptions {
                    destination_url: Some(backend_a.clone()),
                    ..Default::default()
                },
                &Settings::default(),
            )
            .unwrap();
            service.connect_routes(router).unwrap();
            service
                .connect_routes_with(router, Prefixes::from("/alt/*"), Some(backend_b.as_str()))
                .unwrap();
        })
        .await;
        let client = test_client();

        let v: Value = client
            .get(format!("{app}/1.0/x"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["via"], "a");

        let v: Value = client
            .get(format!("{app}/alt/x"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["via"], "b");
    }
}
