//! Top-level router composition and standalone server (spec.md §4.8):
//! nests the primary-side replication router and the relay's router
//! alongside this crate's own `/query`/`/batch`/`/health`/`/metrics`
//! routes, under one CORS layer and one rate-limit middleware layer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use replication_server::ReplicationServerState;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::HttpConfig;
use crate::middleware::rate_limit;
use crate::state::AppState;

fn cors_layer(config: &HttpConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
}

/// Assembles the full router served by [`HttpServer::start`]: this
/// crate's own routes, nested under the replication server's `/wal`
/// routes (when this node accepts replicas) and the relay's routes
/// (when this node hosts relay traffic), with CORS and rate-limit
/// layers applied over the whole thing.
#[must_use]
pub fn build_router(
    state: Arc<AppState>,
    config: &HttpConfig,
    replication: Option<Arc<ReplicationServerState>>,
    relay: Option<Arc<relay_store::RelayServerState>>,
) -> Router {
    let mut router = crate::routes::router(state.clone());

    if let Some(replication) = replication {
        router = router.merge(replication_server::router(replication));
    }

    if let Some(relay) = relay {
        router = router.merge(relay_store::routes::router(relay));
    }

    router
        .layer(axum::middleware::from_fn_with_state(state, rate_limit))
        .layer(cors_layer(config))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
}

/// A bound, ready-to-run instance of the composed router.
pub struct HttpServer {
    router: Router,
    bind_addr: SocketAddr,
}

impl HttpServer {
    /// Builds a server over `state`, nesting `replication` and `relay`
    /// routers when present, per `config`.
    #[must_use]
    pub fn new(
        state: Arc<AppState>,
        config: &HttpConfig,
        replication: Option<Arc<ReplicationServerState>>,
        relay: Option<Arc<relay_store::RelayServerState>>,
    ) -> Self {
        Self {
            router: build_router(state, config, replication, relay),
            bind_addr: config.bind_addr,
        }
    }

    /// Binds `bind_addr` and serves until the process is killed or the
    /// listener errors. Client IPs are extracted via `ConnectInfo`, which
    /// the rate-limit middleware relies on.
    pub async fn start(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "http adapter listening");
        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>()).await
    }
}
