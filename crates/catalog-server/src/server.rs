use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{Router, middleware, routing::get};
use catalog_storage::DynStore;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::assets::{DynAssetStore, build_asset_store};
use crate::resources::Catalog;
use crate::{config::AppConfig, handlers, middleware as app_middleware, routes};

/// Shared state of the service-level endpoints.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub spool_dir: Arc<PathBuf>,
}

pub struct CatalogServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    config: AppConfig,
}

/// Builds the application with the in-memory store and the configured asset store.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = build_state(cfg, catalog_db_memory::create_store(), None).await?;
    Ok(build_router(cfg, state))
}

/// Creates the upload spool, the asset store (unless given) and every
/// resource manager.
pub async fn build_state(
    cfg: &AppConfig,
    store: DynStore,
    assets: Option<DynAssetStore>,
) -> anyhow::Result<AppState> {
    let spool_dir = cfg.temp_dir();
    tokio::fs::create_dir_all(&spool_dir)
        .await
        .with_context(|| format!("creating upload directory {}", spool_dir.display()))?;

    let assets = match assets {
        Some(assets) => assets,
        None => build_asset_store(&cfg.assets, cfg.asset_timeout())?,
    };
    let catalog = Catalog::build(store, assets, cfg).await?;

    tracing::info!(spool_dir = %spool_dir.display(), "upload directory ready");
    Ok(AppState {
        catalog: Arc::new(catalog),
        spool_dir: Arc::new(spool_dir),
    })
}

pub fn build_router(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let api = routes::api_routes(&state.catalog, state.spool_dir.as_ref().clone());

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .with_state(state)
        .merge(api)
        // Later layers wrap earlier ones; the request id is set before the trace span opens
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

fn request_span<B>(req: &axum::http::Request<B>) -> tracing::Span {
    use tracing::field::Empty;
    let req_id = req
        .extensions()
        .get::<axum::http::HeaderValue>()
        .or_else(|| req.headers().get(app_middleware::REQUEST_ID_HEADER))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    tracing::info_span!(
        "http.request",
        http.method = %req.method(),
        http.target = %req.uri(),
        http.route = Empty,
        http.status_code = Empty,
        request_id = %req_id
    )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynStore>,
    assets: Option<DynAssetStore>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
            assets: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn with_store(mut self, store: DynStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_asset_store(mut self, assets: DynAssetStore) -> Self {
        self.assets = Some(assets);
        self
    }

    pub async fn build(self) -> anyhow::Result<CatalogServer> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let store = self.store.unwrap_or_else(catalog_db_memory::create_store);
        let state = build_state(&self.config, store, self.assets).await?;
        let app = build_router(&self.config, state.clone());

        Ok(CatalogServer {
            addr: self.addr,
            app,
            state,
            config: self.config,
        })
    }
}

impl CatalogServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let purge = self.spawn_cache_purge();
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        if let Some(purge) = purge {
            purge.abort();
        }
        result?;
        Ok(())
    }

    /// Periodically drops expired list snapshots so idle keys do not linger.
    fn spawn_cache_purge(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.cache.enabled {
            return None;
        }
        let catalog = Arc::clone(&self.state.catalog);
        let period = self.config.list_ttl();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = catalog.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "expired list cache entries removed");
                }
            }
        }))
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
