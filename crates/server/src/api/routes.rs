use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{batches, documents, handlers, middleware::auth_middleware, ws};
use super::middleware::metrics_middleware;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Unauthenticated: health checks, scraping and the socket (which checks its own token)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        .route("/ws/{owner_id}", get(ws::ws_handler));

    let protected_routes = Router::new()
        // Batches
        .route(
            "/batches",
            post(batches::create_batch).get(batches::list_batches),
        )
        .route(
            "/batches/{id}",
            get(batches::get_batch).delete(batches::delete_batch),
        )
        .route(
            "/batches/{id}/documents",
            post(batches::add_document).get(batches::list_documents),
        )
        .route("/batches/{id}/process", post(batches::process_batch))
        .route("/batches/{id}/queue-status", get(batches::queue_status))
        // Documents
        .route(
            "/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/{id}/retry", post(documents::retry_document))
        .route("/documents/{id}/review", post(documents::review_document))
        // Dispatcher
        .route("/dispatcher/status", get(handlers::dispatcher_status))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api_routes = public_routes.merge(protected_routes).with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
