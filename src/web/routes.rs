use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

// API Routes - natural language to SQL
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate_sql", post(handlers::api::generate_sql))
        .route("/health", get(handlers::api::health))
}

// Browser front-ends are served from other origins, so CORS is wide open
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    api_routes()
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
