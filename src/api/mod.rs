//! HTTP API: Axum server over the snapshot workflows.
//!
//! CORS is open for local front-end development; every request is traced.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use routes::{ApiState, AppState};

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        // Snapshot lifecycle
        .route("/api/snapshots", post(routes::create_snapshot))
        .route(
            "/api/snapshots/:id",
            get(routes::get_snapshot).patch(routes::update_snapshot),
        )
        .route("/api/snapshots/:id/preview", get(routes::preview_snapshot))
        .route("/api/snapshots/:id/finalize", post(routes::finalize_snapshot))
        .route("/api/snapshots/:id/invalidate", post(routes::invalidate_snapshot))
        .route("/api/snapshots/:id/explanation", get(routes::get_explanation))
        // Company views
        .route("/api/companies/:company_id/timeline", get(routes::get_timeline))
        .route("/api/companies/:company_id/compare", get(routes::compare_snapshots))
        .route("/api/companies/:company_id/trends", get(routes::get_trends))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
