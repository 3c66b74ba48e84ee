use axum::{
    Extension, Router, middleware,
    routing::{get, post},
};
use mediahive_core::Access;

use crate::handlers::library::{
    handle_archive::{archive_pages_handler, browse_archive_handler, extract_archive_handler},
    handle_browse::{browse_handler, file_info_handler},
    handle_stream::stream_handler,
};
use crate::infra::{app_state::AppState, middleware::require_bearer};

pub const LIBRARY_PREFIX: &str = "/api/library";
pub const PUBLIC_LIBRARY_PREFIX: &str = "/api/public/library";

/// Routes shared by both access levels.
fn library_routes() -> Router<AppState> {
    Router::new()
        .route("/browse", get(browse_handler))
        .route("/stream", get(stream_handler))
        .route("/archive/extract", post(extract_archive_handler))
        .route("/archive/pages", get(archive_pages_handler))
        .route("/archive/browse", get(browse_archive_handler))
}

/// Every root, behind a bearer token.
pub fn create_private_router(state: AppState) -> Router<AppState> {
    library_routes()
        .route("/info", get(file_info_handler))
        .layer(Extension(Access::Authenticated))
        .layer(middleware::from_fn_with_state(state, require_bearer))
}

/// Allow-listed public roots, no token required.
pub fn create_public_router() -> Router<AppState> {
    library_routes()
        .route("/", get(browse_handler))
        .layer(Extension(Access::Public))
}

pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest(LIBRARY_PREFIX, create_private_router(state))
        .nest(PUBLIC_LIBRARY_PREFIX, create_public_router())
}
