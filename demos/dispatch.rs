//! Request dispatch at the edge — a proxy and a static site on one router.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example dispatch
//!
//! Try:
//!   curl http://localhost:3000/1.0/users              # proxied to :4000
//!   curl http://localhost:3000/index.html             # served from ./public
//!   curl -H 'host: alpha.example.test' http://localhost:3000/
//!                                                     # ./public/alpha, if it exists
//!   curl http://localhost:3000/healthz

use shunt::{
    Method, ProxyOptions, ProxyService, Request, Response, Router, Server, Settings,
    StaticOptions, StaticRoute, StaticService,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Optional shared settings; a missing file just means "all defaults".
    let settings = Settings::load("shunt.toml").unwrap_or_default();

    let mut app = Router::new().on(Method::GET, "/healthz", |_req: Request| async {
        Response::text("ok")
    });

    // /1.0/* → the backend API.
    let api = ProxyService::new(
        ProxyOptions {
            destination_url: Some("http://127.0.0.1:4000".into()),
            log_level: Some(1),
            ..Default::default()
        },
        &settings,
    )
    .expect("proxy client");
    api.connect_routes(&mut app).expect("proxy routes");

    // Everything else → ./public, with host-to-subfolder mapping on.
    let site = StaticService::new(
        StaticOptions {
            root: Some("public".into()),
            magic_hosts: Some(true),
            log_level: Some(1),
            ..Default::default()
        },
        &settings,
    );
    site.add_static_route(&mut app, StaticRoute::default())
        .expect("static route");

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}
