//! OpenID Connect identity provider for the Image Gallery
//!
//! Provides:
//! - OpenID Connect discovery and JWKS
//! - Authorization code flow with PKCE and a local login page
//! - Token issuance (JWT or reference access tokens) and refresh token rotation
//! - UserInfo, token revocation (RFC 7009) and introspection (RFC 7662)
//! - RP-initiated logout
//!
//! `main.rs` wires this into a server; integration tests drive [`router`] directly.

pub mod account;
pub mod client_auth;
pub mod config;
pub mod error;
pub mod grants;
pub mod keys;
pub mod model;
pub mod oauth;
pub mod seed;
pub mod storage;
pub mod tokens;
pub mod users;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::grants::GrantStore;
use crate::keys::SigningCredential;
use crate::storage::ConfigurationStore;
use crate::users::UserStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: ConfigurationStore,
    pub users: UserStore,
    pub grants: GrantStore,
    pub credential: SigningCredential,
    /// Public URL of this provider; also the token issuer
    pub public_url: String,
}

impl AppState {
    pub fn new(
        config: Config,
        store: ConfigurationStore,
        credential: SigningCredential,
        public_url: &str,
    ) -> Self {
        let users = UserStore::new(config.users.clone());
        Self {
            config,
            store,
            users,
            grants: GrantStore::new(),
            credential,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.public_url
    }
}

/// Build the provider's router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Discovery
        .route(
            "/.well-known/openid-configuration",
            get(oauth::discovery::handler),
        )
        .route(
            "/.well-known/openid-configuration/jwks",
            get(oauth::discovery::jwks_handler),
        )
        // Protocol endpoints
        .route("/connect/authorize", get(oauth::authorize::handler))
        .route("/connect/token", post(oauth::token::handler))
        .route(
            "/connect/userinfo",
            get(oauth::userinfo::handler).post(oauth::userinfo::handler),
        )
        .route("/connect/revocation", post(oauth::revocation::handler))
        .route("/connect/introspect", post(oauth::introspection::handler))
        .route("/connect/endsession", get(oauth::endsession::handler))
        // Local account pages
        .route(
            "/account/login",
            get(account::login::get_login).post(account::login::post_login),
        )
        .route("/account/logout", get(account::login::logout))
        .route("/", get(account::login::home))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
