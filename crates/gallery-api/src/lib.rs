//! Image Gallery resource server
//!
//! A bearer-protected REST API over the gallery's images. Access tokens are
//! issued by the gallery identity provider and must name this API as an
//! audience.

pub mod auth;
pub mod authorization;
pub mod config;
pub mod error;
pub mod images;
pub mod repository;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::auth::TokenValidator;
use crate::config::Config;
use crate::repository::GalleryRepository;

/// Uploads travel base64-encoded inside JSON
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn GalleryRepository>,
    pub validator: TokenValidator,
}

impl AppState {
    pub fn new(config: Config, repository: Arc<dyn GalleryRepository>) -> Self {
        let validator = TokenValidator::new(reqwest::Client::new(), &config);
        Self {
            config,
            repository,
            validator,
        }
    }
}

/// Build the API's router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/images",
            get(images::list_images).post(images::create_image),
        )
        .route(
            "/api/images/{id}",
            get(images::get_image)
                .put(images::update_image)
                .delete(images::delete_image),
        )
        .route("/images/{file}", get(images::image_file))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
