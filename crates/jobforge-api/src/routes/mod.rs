pub mod jobs;

use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::request_id;
use crate::state::AppState;

/// Create the main API router with all routes
pub fn create_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .fallback(not_found)
        .layer(middleware::from_fn(request_id::middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Job queue routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/stats", get(jobs::stats))
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "version": jobforge_core::VERSION,
    }))
}

/// Uniform 404 for unknown routes
async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "message": format!("no route for {} {}", method, uri.path()),
            "path": uri.path(),
            "method": method.as_str(),
        })),
    )
}
