//! # MediaHive Server
//!
//! HTTP surface over [`mediahive_core::MediaLibrary`]:
//!
//! - `/api/library/*` browses, streams and unpacks archives in every root,
//!   behind a bearer token
//! - `/api/public/library/*` does the same for allow-listed roots only
//! - `/thumbnails/*` and `/extracted/*` serve derived assets straight from
//!   the cache directories

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use mediahive_core::archive::EXTRACTED_URL_PREFIX;
use mediahive_core::cache::thumbnails::THUMBNAIL_URL_PREFIX;

pub fn create_app(state: AppState) -> Router {
    let dirs = state.library().settings().dirs.clone();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(routes::create_api_router(state.clone()))
        .nest_service(THUMBNAIL_URL_PREFIX, ServeDir::new(&dirs.thumbnails))
        .nest_service(EXTRACTED_URL_PREFIX, ServeDir::new(&dirs.extracted))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
