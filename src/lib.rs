//! # shunt
//!
//! A request-dispatch layer for the edge of a deployment: route, proxy,
//! serve files. Nothing more. Nothing less.
//!
//! ## The shape of it
//!
//! shunt sits where requests fan out — some paths belong to a backend
//! service, some to a directory on disk, the rest to handlers you write:
//!
//! - Radix-tree routing — O(path-length) lookup via [`matchit`]
//! - A proxying service — streams matched requests through to a backend
//!   origin and never crashes on its behalf
//! - A static service — byte-serving with index fallback, conditional
//!   requests, ranges, and optional host-to-subfolder mapping
//! - Graceful shutdown — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! Configuration resolves the same way everywhere: an explicit option wins,
//! then the shared [`Settings`] file, then a built-in default. A service
//! resolves once at construction and never re-reads anything afterwards.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shunt::{
//!     ProxyOptions, ProxyService, Router, Server, Settings, StaticOptions,
//!     StaticRoute, StaticService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shunt::Error> {
//!     let settings = Settings::load("shunt.toml").unwrap_or_default();
//!     let mut app = Router::new();
//!
//!     // /1.0/* (the default prefix) goes to the backend.
//!     let api = ProxyService::new(
//!         ProxyOptions {
//!             destination_url: Some("http://127.0.0.1:4000".into()),
//!             ..Default::default()
//!         },
//!         &settings,
//!     )?;
//!     api.connect_routes(&mut app)?;
//!
//!     // Everything else comes off disk.
//!     let site = StaticService::new(
//!         StaticOptions { root: Some("public".into()), ..Default::default() },
//!         &settings,
//!     );
//!     site.add_static_route(&mut app, StaticRoute::default())?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```
//!
//! Plain handlers register straight on the [`Router`]:
//!
//! ```rust,no_run
//! use shunt::{Method, Request, Response, Router};
//!
//! let _app = Router::new().on(Method::GET, "/healthz", |_req: Request| async {
//!     Response::text("ok")
//! });
//! ```

mod config;
mod error;
mod handler;
mod proxy;
mod request;
mod response;
mod router;
mod server;
mod static_files;

pub mod files;
pub mod forward;
pub mod routes;

pub use config::{ProxySettings, Settings, StaticSettings};
pub use error::Error;
pub use forward::{ForwardOptions, Forwarder};
pub use handler::Handler;
pub use http::{Method, StatusCode};
pub use proxy::{ProxyConfig, ProxyOptions, ProxyService};
pub use request::Request;
pub use response::{BoxError, BoxedBody, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use routes::Prefixes;
pub use server::Server;
pub use static_files::{StaticOptions, StaticRoute, StaticService};
