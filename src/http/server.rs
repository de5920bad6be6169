//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the lookup and health handlers
//! - Wire up middleware (request ID, tracing, timeout, CORS, body limit, rate limit)
//! - Serve on a listener until shutdown, running the cache and rate-limit sweepers alongside
//!
//! A request that outlives `timeouts.request_secs` is answered with
//! 504 Gateway Timeout: the only slow path is the upstream provider.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{CorsConfig, PwnedConfig};
use crate::http::request::{PwnedRangeRequest, UuidRequestId};
use crate::lifecycle::shutdown::wait_for;
use crate::range::error::UpstreamResult;
use crate::range::{LookupError, LookupOutcome, MemoryStore, PwnedRangeService};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiterState};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PwnedRangeService>,
}

/// HTTP front end for the lookup service.
pub struct HttpServer {
    router: Router,
    config: PwnedConfig,
    store: Option<Arc<MemoryStore>>,
    limiter: Option<Arc<RateLimiterState>>,
}

impl HttpServer {
    /// Build the full service (HTTP fetcher + in-process store) from config.
    pub fn new(config: PwnedConfig) -> UpstreamResult<Self> {
        let (service, store) = PwnedRangeService::with_memory_store(&config)?;
        let mut server = Self::with_service(config, service);
        server.store = Some(store);
        Ok(server)
    }

    /// Serve an already assembled service.
    pub fn with_service(config: PwnedConfig, service: PwnedRangeService) -> Self {
        let state = AppState {
            service: Arc::new(service),
        };
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiterState::new(&config.rate_limit)));
        let router = Self::build_router(&config, state, limiter.clone());
        Self {
            router,
            config,
            store: None,
            limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &PwnedConfig, state: AppState, limiter: Option<Arc<RateLimiterState>>) -> Router {
        let mut router = Router::new()
            .route("/api/v1/pwned-range", post(pwned_range_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        router
            .layer(DefaultBodyLimit::max(config.listener.max_body_size))
            .layer(cors_layer(&config.cors))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(store) = &self.store {
            let _sweeper = store.clone().spawn_sweeper(
                Duration::from_secs(self.config.cache.sweep_interval_secs),
                shutdown.resubscribe(),
            );
        }
        if let Some(limiter) = &self.limiter {
            let _sweeper = limiter.clone().spawn_sweeper(
                Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
                shutdown.resubscribe(),
            );
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &PwnedConfig {
        &self.config
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Look up all breached suffixes for a hash prefix.
async fn pwned_range_handler(
    State(state): State<AppState>,
    Json(request): Json<PwnedRangeRequest>,
) -> Result<Json<LookupOutcome>, LookupError> {
    let outcome = state.service.lookup(&request.prefix).await?;
    Ok(Json(outcome))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
