//! HTTP API server for the shop checkout backend.
//!
//! Provides REST endpoints for carts, checkout, payments and order
//! history, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{InMemoryGateway, SimulatedGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{GatewayConfig, GatewayMode};
use routes::{AppState, SharedGateway};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/users/{user_id}/cart",
            get(routes::cart::get)
                .post(routes::cart::update)
                .delete(routes::cart::clear),
        )
        .route("/users/{user_id}/checkout", post(routes::payments::initiate))
        .route(
            "/users/{user_id}/checkout/complete",
            post(routes::payments::complete),
        )
        .route(
            "/users/{user_id}/payments",
            get(routes::payments::list_for_user),
        )
        .route("/users/{user_id}/orders", get(routes::orders::list_for_user))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/payments/{id}/settle", post(routes::payments::settle))
        .route("/payments/{id}/process", post(routes::payments::process))
        .route("/payments/{id}/cancel", post(routes::payments::cancel))
        .route("/payments/{id}/resume", post(routes::payments::resume))
        .route("/orders/{id}", get(routes::orders::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the payment gateway selected by configuration.
pub fn build_gateway(config: &GatewayConfig) -> SharedGateway {
    match config.mode {
        GatewayMode::Simulated => Arc::new(SimulatedGateway::new(config.success_rate, config.delay)),
        GatewayMode::Approve => Arc::new(InMemoryGateway::approving()),
        GatewayMode::Decline => Arc::new(InMemoryGateway::declining()),
    }
}
