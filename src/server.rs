//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let uploads_route = state.config.server.uploads_route.clone();
    let uploads_dir = ServeDir::new(state.catalog.uploads().dir());
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/books", get(handlers::list_books).post(handlers::create_book))
        .route(
            "/books/{id}",
            get(handlers::get_book)
                .put(handlers::update_book)
                .delete(handlers::delete_book),
        )
        .nest_service(&uploads_route, uploads_dir)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
