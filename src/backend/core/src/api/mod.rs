//! API layer for Bizdash.
//!
//! REST interface (via Axum) over the authorization core. Every resource
//! handler is a thin wrapper: resolve the caller, ask the [`Authorizer`],
//! then hand the finalized row or visibility predicate to the store.
//!
//! # Layers
//!
//! Requests pass through, outermost first:
//! 1. CORS and HTTP tracing
//! 2. [`AuthLayer`]: validates the bearer token, or marks public paths anonymous
//! 3. [`IdentityLayer`]: resolves the token claims into an [`Identity`](crate::authz::Identity)

mod handlers;
pub mod v1;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::authz::{Authorizer, IdentityLayer};
use crate::middleware::auth::{AuthLayer, Authenticator};
use crate::store::RowStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<Authorizer>,
    pub store: Arc<dyn RowStore>,
    pub authenticator: Arc<Authenticator>,
    /// Render handle of the installed Prometheus recorder, if any.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        authorizer: Authorizer,
        store: Arc<dyn RowStore>,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
            store,
            authenticator: Arc::new(authenticator),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the API router.
///
/// This creates a router with:
/// - Health check endpoint (public)
/// - Metrics endpoint (public)
/// - V1 API routes under `/api/v1/`
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState::new(Authorizer::default(), store, authenticator);
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(v1::V1_PREFIX, v1::v1_router())
        // Identity resolution runs inside authentication
        .layer(IdentityLayer::new(state.store.clone()))
        .layer(AuthLayer::new(state.authenticator.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Success envelope; errors render through [`crate::error::BizdashError`].
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
