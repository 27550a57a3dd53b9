//! The static-files component.
//!
//! A [`StaticService`] resolves its defaults once — explicit options, then
//! shared [`Settings`], then built-ins — and can then mount any number of
//! routes, each with its own root, pattern, index file and strip prefix.
//! Routes are `GET`-only; byte-serving itself is delegated to
//! [`files::serve`].
//!
//! With `magic_hosts` enabled, the leftmost subdomain of the request's host
//! selects a subfolder of the root: `alpha.example.test` serves from
//! `<root>/alpha` *if that directory exists at request time*, and falls back
//! to the root otherwise. The probe runs per request, so dropping a folder
//! into the root takes effect immediately.

use std::path::PathBuf;
use std::sync::Arc;

use http::Method;
use tracing::{info, warn};

use crate::config::{self, Settings};
use crate::error::Error;
use crate::files::{self, ServeOptions};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::routes;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Construction-time knobs. Unset fields resolve from [`Settings`] and then
/// from the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticOptions {
    /// Directory files are served from. May also be given per route; a
    /// route without any root at all refuses to mount.
    pub root: Option<PathBuf>,
    /// File served for directory paths. Defaults to `index.html`.
    pub index_file: Option<String>,
    /// Route pattern to mount under. Defaults to `/*`.
    pub pattern: Option<String>,
    /// Leading path segment removed before disk lookup. Defaults to `/`.
    pub strip_prefix: Option<String>,
    /// Map the leftmost subdomain to a subfolder of the root.
    pub magic_hosts: Option<bool>,
    /// `0` silences per-request logging. An explicit `0` wins over settings.
    pub log_level: Option<u8>,
    /// `cache-control` value attached to served files.
    pub cache_control: Option<String>,
    /// Serve dotfiles too. Off unless you know you need it.
    pub serve_hidden: bool,
}

/// Per-route overrides for [`StaticService::add_static_route`]. Unset fields
/// inherit the service's resolved defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticRoute {
    pub root: Option<PathBuf>,
    pub index_file: Option<String>,
    pub pattern: Option<String>,
    pub strip_prefix: Option<String>,
}

/// Everything one mounted route needs at request time.
struct StaticConfig {
    root: PathBuf,
    strip_prefix: String,
    magic_hosts: bool,
    log_level: u8,
    serve: ServeOptions,
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Mounts directory-serving routes on a [`Router`].
pub struct StaticService {
    root: Option<PathBuf>,
    index_file: String,
    pattern: String,
    strip_prefix: String,
    magic_hosts: bool,
    log_level: u8,
    cache_control: Option<String>,
    serve_hidden: bool,
}

impl StaticService {
    /// Resolves `options` against `settings`. Construction cannot fail; a
    /// missing root only matters once a route is mounted.
    pub fn new(options: StaticOptions, settings: &Settings) -> Self {
        let shared = &settings.static_files;
        Self {
            root: options.root.or_else(|| shared.root.clone()),
            index_file: options
                .index_file
                .or_else(|| shared.index_file.clone())
                .unwrap_or_else(|| config::DEFAULT_INDEX.to_owned()),
            pattern: options
                .pattern
                .or_else(|| shared.pattern.clone())
                .unwrap_or_else(|| config::DEFAULT_PATTERN.to_owned()),
            strip_prefix: options
                .strip_prefix
                .or_else(|| shared.strip_prefix.clone())
                .unwrap_or_else(|| config::DEFAULT_STRIP.to_owned()),
            magic_hosts: options.magic_hosts.or(shared.magic_hosts).unwrap_or(false),
            log_level: config::resolve_log_level(options.log_level, shared.log_level),
            cache_control: options.cache_control,
            serve_hidden: options.serve_hidden,
        }
    }

    /// Mounts one serving route, taking any unset field of `route` from the
    /// service's defaults. Returns how many routes were newly added; mounting
    /// the same pattern twice leaves the first handler in place.
    ///
    /// Fails with [`Error::MissingRoot`] when neither the route nor the
    /// service has a root directory.
    pub fn add_static_route(&self, router: &mut Router, route: StaticRoute) -> Result<usize, Error> {
        let root = route
            .root
            .or_else(|| self.root.clone())
            .filter(|p| !p.as_os_str().is_empty());
        let Some(root) = root else {
            warn!("static route has no root directory, refusing to mount");
            return Err(Error::MissingRoot);
        };
        let pattern = route.pattern.unwrap_or_else(|| self.pattern.clone());
        let strip_prefix = route.strip_prefix.unwrap_or_else(|| self.strip_prefix.clone());
        let index = route.index_file.unwrap_or_else(|| self.index_file.clone());

        let config = Arc::new(StaticConfig {
            root,
            strip_prefix,
            magic_hosts: self.magic_hosts,
            log_level: self.log_level,
            serve: ServeOptions {
                index,
                cache_control: self.cache_control.clone(),
                serve_hidden: self.serve_hidden,
                ..Default::default()
            },
        });
        let handler = move |req: Request| {
            let config = Arc::clone(&config);
            async move { serve_static(&config, req).await }
        };
        routes::connect(router, &[pattern], &[Method::GET], handler)
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

async fn serve_static(config: &StaticConfig, req: Request) -> Response {
    if config.log_level > 0 {
        access_log(&req);
    }
    let root = match magic_subfolder(config, &req) {
        Some(sub) => config.root.join(sub),
        None => config.root.clone(),
    };
    let path = serve_path(req.path(), &config.strip_prefix).to_owned();
    files::serve(&root, &path, req, &config.serve).await
}

/// Removes the strip prefix from the request path. A fully-stripped path
/// becomes `/`, which the serving layer resolves to the index file.
fn serve_path<'a>(path: &'a str, strip: &str) -> &'a str {
    match path.strip_prefix(strip) {
        Some("") => "/",
        Some(stripped) => stripped,
        None => path,
    }
}

/// Decides which subfolder, if any, the request's host maps to. The answer
/// depends on what is on disk right now, not on what was there at mount time.
fn magic_subfolder(config: &StaticConfig, req: &Request) -> Option<String> {
    if !config.magic_hosts {
        return None;
    }
    let host = req.host()?.split(':').next()?;
    let mut labels = host.split('.');
    let leftmost = labels.next()?;
    // Single-label hosts like `localhost` have no subdomain to map.
    labels.next()?;
    if leftmost.is_empty()
        || !leftmost
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    let candidate = config.root.join(leftmost);
    candidate.is_dir().then(|| leftmost.to_owned())
}

fn access_log(req: &Request) {
    let peer = req.peer_addr().map(|a| a.to_string());
    let local = req.local_addr().map(|a| a.to_string());
    info!(
        method = %req.method(),
        path = req.path(),
        host = req.host().unwrap_or("-"),
        user_agent = req.header("user-agent").unwrap_or("-"),
        peer = peer.as_deref().unwrap_or("-"),
        local = local.as_deref().unwrap_or("-"),
        "static request",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::path::Path;

    #[test]
    fn resolution_prefers_options_then_settings() {
        let mut settings = Settings::default();
        settings.static_files.root = Some(PathBuf::from("/srv/settings"));
        settings.static_files.index_file = Some("default.htm".into());
        settings.static_files.pattern = Some("/files/*".into());
        settings.static_files.magic_hosts = Some(true);
        settings.static_files.log_level = Some(3);

        let service = StaticService::new(
            StaticOptions {
                root: Some(PathBuf::from("/srv/options")),
                log_level: Some(0),
                ..Default::default()
            },
            &settings,
        );
        assert_eq!(service.root.as_deref(), Some(Path::new("/srv/options")));
        assert_eq!(service.index_file, "default.htm");
        assert_eq!(service.pattern, "/files/*");
        assert_eq!(service.strip_prefix, "/");
        assert!(service.magic_hosts);
        assert_eq!(service.log_level, 0, "explicit zero wins");
    }

    #[test]
    fn missing_root_refuses_to_mount() {
        let service = StaticService::new(StaticOptions::default(), &Settings::default());
        let mut router = Router::new();
        let err = service
            .add_static_route(&mut router, StaticRoute::default())
            .unwrap_err();
        assert!(matches!(err, Error::MissingRoot));

        // An empty path is as useless as no path.
        let err = service
            .add_static_route(
                &mut router,
                StaticRoute { root: Some(PathBuf::new()), ..Default::default() },
            )
            .unwrap_err();
        assert!(matches!(err, Error::MissingRoot));
        assert!(router.lookup(&Method::GET, "/anything").is_none());
    }

    #[test]
    fn routes_are_get_only_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let service = StaticService::new(
            StaticOptions {
                root: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            &Settings::default(),
        );
        let mut router = Router::new();
        // "/*" expands to the root itself plus the catch-all.
        assert_eq!(
            service.add_static_route(&mut router, StaticRoute::default()).unwrap(),
            2
        );
        assert_eq!(
            service.add_static_route(&mut router, StaticRoute::default()).unwrap(),
            0
        );
        assert!(router.lookup(&Method::GET, "/any/file.txt").is_some());
        assert!(router.lookup(&Method::POST, "/any/file.txt").is_none());
    }

    #[test]
    fn route_overrides_beat_service_defaults() {
        let service_dir = tempfile::tempdir().unwrap();
        let route_dir = tempfile::tempdir().unwrap();

        let service = StaticService::new(
            StaticOptions {
                root: Some(service_dir.path().to_path_buf()),
                ..Default::default()
            },
            &Settings::default(),
        );
        let mut router = Router::new();
        service
            .add_static_route(
                &mut router,
                StaticRoute {
                    root: Some(route_dir.path().to_path_buf()),
                    pattern: Some("/docs/*".into()),
                    strip_prefix: Some("/docs".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(router.lookup(&Method::GET, "/docs/page.html").is_some());
        assert!(router.lookup(&Method::GET, "/page.html").is_none());
    }

    #[test]
    fn strip_prefix_rules() {
        assert_eq!(serve_path("/app", "/app"), "/");
        assert_eq!(serve_path("/app/x/y", "/app"), "/x/y");
        assert_eq!(serve_path("/other", "/app"), "/other");
        assert_eq!(serve_path("/", "/"), "/");
        assert_eq!(serve_path("/hello.txt", "/"), "hello.txt");
    }

    fn magic_config(root: &Path) -> StaticConfig {
        StaticConfig {
            root: root.to_path_buf(),
            strip_prefix: "/".into(),
            magic_hosts: true,
            log_level: 0,
            serve: ServeOptions::default(),
        }
    }

    #[test]
    fn magic_host_picks_an_existing_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        let config = magic_config(dir.path());

        let req = Request::fake(Method::GET, "/", &[("host", "alpha.example.test")]);
        assert_eq!(magic_subfolder(&config, &req).as_deref(), Some("alpha"));

        // A port does not hide the subdomain.
        let req = Request::fake(Method::GET, "/", &[("host", "alpha.example.test:8080")]);
        assert_eq!(magic_subfolder(&config, &req).as_deref(), Some("alpha"));
    }

    #[test]
    fn magic_host_falls_back_to_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        let config = magic_config(dir.path());

        // No such subfolder on disk.
        let req = Request::fake(Method::GET, "/", &[("host", "ghost.example.test")]);
        assert_eq!(magic_subfolder(&config, &req), None);
        // Single-label hosts have no subdomain to map.
        let req = Request::fake(Method::GET, "/", &[("host", "localhost")]);
        assert_eq!(magic_subfolder(&config, &req), None);
        // Oddball labels are not path material.
        let req = Request::fake(Method::GET, "/", &[("host", "a%b.example.test")]);
        assert_eq!(magic_subfolder(&config, &req), None);

        let off = StaticConfig {
            magic_hosts: false,
            ..magic_config(dir.path())
        };
        let req = Request::fake(Method::GET, "/", &[("host", "alpha.example.test")]);
        assert_eq!(magic_subfolder(&off, &req), None);
    }

    #[tokio::test]
    async fn handler_serves_bytes_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "from disk").unwrap();
        let service = StaticService::new(
            StaticOptions {
                root: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
            &Settings::default(),
        );
        let mut router = Router::new();
        service.add_static_route(&mut router, StaticRoute::default()).unwrap();

        let (handler, _params) = router.lookup(&Method::GET, "/hello.txt").unwrap();
        // Run on a spawned task, as the server does: the future must be `Send`.
        let resp = tokio::spawn(handler.call(Request::fake(Method::GET, "/hello.txt", &[])))
            .await
            .unwrap();
        assert_eq!(resp.status_code(), StatusCode::OK);
    }

    // ── End to end ────────────────────────────────────────────────────────────

    use crate::server::Server;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn serves_a_site_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("hello.txt"), "from disk").unwrap();
        std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::create_dir(root.join("alpha")).unwrap();
        std::fs::write(root.join("alpha/hello.txt"), "from alpha").unwrap();

        let service = StaticService::new(
            StaticOptions {
                root: Some(root.to_path_buf()),
                magic_hosts: Some(true),
                ..Default::default()
            },
            &Settings::default(),
        );
        let mut app = Router::new();
        service.add_static_route(&mut app, StaticRoute::default()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(Server::serve_on(listener, app));
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let resp = client.get(format!("{base}/hello.txt")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        let etag = resp.headers()["etag"].to_str().unwrap().to_owned();
        assert_eq!(resp.text().await.unwrap(), "from disk");

        // Directory paths land on the index file.
        let resp = client.get(format!("{base}/")).send().await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "<h1>home</h1>");

        // The leftmost host label picks the matching subfolder.
        let resp = client
            .get(format!("{base}/hello.txt"))
            .header("host", "alpha.example.test")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "from alpha");

        let resp = client
            .get(format!("{base}/hello.txt"))
            .header("range", "bytes=0-3")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers()["content-range"], "bytes 0-3/9");
        assert_eq!(resp.text().await.unwrap(), "from");

        let resp = client
            .get(format!("{base}/hello.txt"))
            .header("if-none-match", etag.as_str())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

        let resp = client.get(format!("{base}/nope.txt")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
