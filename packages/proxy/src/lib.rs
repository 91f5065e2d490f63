#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Caching mirror proxy for the upstream county CSV documents.
//!
//! Serves each configured resource at `/<path>`, backed by a disk mirror
//! that refreshes from upstream once its TTL lapses. The fetch log and the
//! mirror's timestamp files are refused with `403`.

pub mod config;
mod handlers;
pub mod interactive;
pub mod mirror;

use std::collections::BTreeMap;
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use covid_map_proxy_models::ProxyConfig;
use covid_map_series_models::Resource;
use covid_map_source::{DatasetSource, HttpSource};

pub use config::{ConfigError, load_config};
pub use mirror::{FetchLog, MirrorCache, MirrorEntry, MirrorError};

/// What a request path maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Serve the mirrored resource.
    Resource(Resource),
    /// Refuse with `403`.
    Forbidden,
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// The disk mirror.
    pub mirror: MirrorCache,
    /// Request paths (without the leading `/`) and what they map to.
    pub routes: BTreeMap<String, Route>,
}

impl AppState {
    /// Builds the mirror and route table described by `config`.
    #[must_use]
    pub fn new(config: &ProxyConfig, upstream: Arc<dyn DatasetSource>) -> Self {
        Self {
            mirror: MirrorCache::from_config(config, upstream),
            routes: build_routes(config),
        }
    }
}

/// Maps every configured path to its route. Metadata files and the log
/// are forbidden; a path configured as both stays forbidden.
#[must_use]
pub fn build_routes(config: &ProxyConfig) -> BTreeMap<String, Route> {
    let mut routes = BTreeMap::new();

    for entry in &config.resources {
        routes.insert(route_key(&entry.path), Route::Resource(entry.resource));
    }
    for entry in &config.resources {
        routes.insert(route_key(&entry.meta_path), Route::Forbidden);
    }
    routes.insert(route_key(&config.log_path), Route::Forbidden);

    routes
}

fn route_key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// Upstream source fetching each configured resource from its remote URL.
#[must_use]
pub fn upstream_source(config: &ProxyConfig) -> HttpSource {
    HttpSource::new(
        config
            .resources
            .iter()
            .map(|r| (r.resource, r.remote_url.clone()))
            .collect(),
    )
}

/// Registers the proxy's routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/{path:.*}", web::get().to(handlers::mirrored));
}

/// Starts the mirror proxy.
///
/// Prepares the data directory, binds the configured address, and runs
/// the Actix-Web server until shutdown. The caller is responsible for
/// providing the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the data directory cannot be
/// created, or the HTTP server fails to bind or encounters a runtime
/// error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ProxyConfig) -> std::io::Result<()> {
    let upstream: Arc<dyn DatasetSource> = Arc::new(upstream_source(&config));
    let state = web::Data::new(AppState::new(&config, upstream));

    state
        .mirror
        .prepare()
        .await
        .map_err(std::io::Error::other)?;

    for (path, route) in &state.routes {
        log::debug!("Route /{path} -> {route:?}");
    }

    let addr = config.socket_addr();
    log::info!("Starting server on {addr}");

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?;

    state
        .mirror
        .fetch_log()
        .record(&format!("Server listening on {addr}"))
        .await;

    server.run().await
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use actix_web::{http::StatusCode, test};
    use async_trait::async_trait;
    use covid_map_proxy_models::{ApiHealth, ResourceConfig};
    use covid_map_source::SourceError;

    use super::*;

    #[derive(Default)]
    struct FakeUpstream {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl DatasetSource for FakeUpstream {
        async fn fetch(&self, resource: Resource) -> Result<String, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Status {
                    url: format!("fake://{resource}"),
                    status: 500,
                });
            }
            Ok(format!("countyFIPS,{resource}\n"))
        }
    }

    fn config(root: PathBuf) -> ProxyConfig {
        let resource = |resource: Resource, ttl_secs: Option<u64>| ResourceConfig {
            resource,
            path: format!("proxy_data/{resource}.csv"),
            meta_path: format!("proxy_data/{resource}_timestamp.txt"),
            remote_url: format!("https://example.com/{resource}.csv"),
            ttl_secs,
        };
        ProxyConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            data_root: root,
            log_path: "proxy_data/log.txt".to_string(),
            resources: vec![
                resource(Resource::Cases, Some(60)),
                resource(Resource::Populations, None),
            ],
        }
    }

    async fn state(name: &str, upstream: &Arc<FakeUpstream>) -> web::Data<AppState> {
        let root = std::env::temp_dir().join(format!("covid_map_proxy_{name}"));
        let _ = std::fs::remove_dir_all(&root);
        let state = AppState::new(&config(root), upstream.clone());
        state.mirror.prepare().await.unwrap();
        web::Data::new(state)
    }

    #[::core::prelude::v1::test]
    fn metadata_and_log_paths_are_forbidden() {
        let routes = build_routes(&config(PathBuf::from(".")));
        assert_eq!(
            routes.get("proxy_data/cases.csv"),
            Some(&Route::Resource(Resource::Cases))
        );
        assert_eq!(
            routes.get("proxy_data/cases_timestamp.txt"),
            Some(&Route::Forbidden)
        );
        assert_eq!(routes.get("proxy_data/log.txt"), Some(&Route::Forbidden));
        assert_eq!(routes.get("proxy_data/deaths.csv"), None);
    }

    #[::core::prelude::v1::test]
    fn upstream_urls_come_from_config() {
        let source = upstream_source(&config(PathBuf::from(".")));
        assert_eq!(
            source.url(Resource::Populations),
            Some("https://example.com/populations.csv")
        );
        assert_eq!(source.url(Resource::Deaths), None);
    }

    #[actix_web::test]
    async fn serves_mirrored_resource_as_plain_text() {
        let upstream = Arc::new(FakeUpstream::default());
        let state = state("serves", &upstream).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        for _ in 0..2 {
            let req = test::TestRequest::get()
                .uri("/proxy_data/cases.csv")
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(
                resp.headers().get("content-type").unwrap(),
                "text/plain; charset=UTF-8"
            );
            let body = test::read_body(resp).await;
            assert_eq!(body, "countyFIPS,cases\n");
        }

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn upstream_failure_is_500() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.failing.store(true, Ordering::SeqCst);
        let state = state("failure", &upstream).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/proxy_data/populations.csv")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn log_and_metadata_are_403_and_unknown_is_404() {
        let upstream = Arc::new(FakeUpstream::default());
        let state = state("forbidden", &upstream).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        for (uri, status) in [
            ("/proxy_data/log.txt", StatusCode::FORBIDDEN),
            ("/proxy_data/cases_timestamp.txt", StatusCode::FORBIDDEN),
            ("/proxy_data/populations_timestamp.txt", StatusCode::FORBIDDEN),
            ("/proxy_data/deaths.csv", StatusCode::NOT_FOUND),
            ("/", StatusCode::NOT_FOUND),
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), status, "{uri}");
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let upstream = Arc::new(FakeUpstream::default());
        let state = state("health", &upstream).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["healthy"], serde_json::Value::Bool(true));
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));

        let health: ApiHealth = serde_json::from_value(json).unwrap();
        assert!(health.healthy);
    }
}
