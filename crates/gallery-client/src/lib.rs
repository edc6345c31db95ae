//! Image Gallery web client
//!
//! Users sign in at the identity provider through the authorization code
//! flow with PKCE. Their tokens are kept in a server-side cookie session and
//! the access token is attached to every call to the image API, refreshed
//! shortly before it expires.

pub mod bearer;
pub mod config;
pub mod error;
pub mod gallery;
pub mod html;
pub mod oidc;
pub mod policy;
pub mod provider;
pub mod session;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::bearer::ApiClient;
use crate::config::Config;
use crate::oidc::ChallengeStore;
use crate::provider::OidcProvider;
use crate::session::SessionStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub provider: Arc<OidcProvider>,
    pub sessions: Arc<SessionStore>,
    pub challenges: ChallengeStore,
    pub api: ApiClient,
    /// Public base URL of this client, without trailing slash
    pub public_url: String,
}

impl AppState {
    pub fn new(config: Config, public_url: &str) -> Self {
        let http = reqwest::Client::new();
        let provider = Arc::new(OidcProvider::new(http.clone(), &config));
        let sessions = Arc::new(SessionStore::new(config.session.session_lifetime_secs));
        let api = ApiClient::new(
            http,
            &config.api_base_url,
            provider.clone(),
            sessions.clone(),
        );

        Self {
            config,
            provider,
            sessions,
            challenges: ChallengeStore::new(),
            api,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.public_url, oidc::SIGNIN_CALLBACK_PATH)
    }

    pub fn post_logout_redirect_uri(&self) -> String {
        format!("{}{}", self.public_url, oidc::SIGNOUT_CALLBACK_PATH)
    }
}

/// Build the client's router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(gallery::index))
        .route("/gallery", get(gallery::index))
        .route("/gallery/edit-image/{id}", get(gallery::edit_image_form))
        .route("/gallery/edit-image", post(gallery::edit_image))
        .route("/gallery/delete-image/{id}", get(gallery::delete_image))
        .route(
            "/gallery/add-image",
            get(gallery::add_image_form).post(gallery::add_image),
        )
        .route("/gallery/order-frame", get(gallery::order_frame))
        .route("/gallery/logout", get(gallery::logout))
        .route(oidc::SIGNIN_CALLBACK_PATH, get(oidc::signin_callback))
        .route(oidc::SIGNOUT_CALLBACK_PATH, get(gallery::signout_callback))
        .route("/authorization/access-denied", get(gallery::access_denied))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
