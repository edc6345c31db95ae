//! OpenID Connect Discovery
//!
//! Provides `/.well-known/openid-configuration` and the JWKS document that
//! clients and APIs use to find endpoints and verify token signatures.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::model::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};
use crate::AppState;

/// OpenID Provider Metadata
#[derive(Debug, Serialize)]
pub struct ProviderMetadata {
    /// The issuer identifier; equals the `iss` of every token we sign
    pub issuer: String,
    pub jwks_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub end_session_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub frontchannel_logout_supported: bool,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

/// Handler for `GET /.well-known/openid-configuration`
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<ProviderMetadata> {
    let base_url = state.issuer();

    let mut claims_supported: Vec<String> = vec!["sub".to_string()];
    for resource in state.store.identity_resources() {
        for claim in resource.user_claims {
            if !claims_supported.contains(&claim) {
                claims_supported.push(claim);
            }
        }
    }

    let metadata = ProviderMetadata {
        issuer: base_url.to_string(),
        jwks_uri: format!("{}/.well-known/openid-configuration/jwks", base_url),
        authorization_endpoint: format!("{}/connect/authorize", base_url),
        token_endpoint: format!("{}/connect/token", base_url),
        userinfo_endpoint: format!("{}/connect/userinfo", base_url),
        end_session_endpoint: format!("{}/connect/endsession", base_url),
        revocation_endpoint: format!("{}/connect/revocation", base_url),
        introspection_endpoint: format!("{}/connect/introspect", base_url),
        frontchannel_logout_supported: false,
        scopes_supported: state.store.supported_scopes(),
        claims_supported,
        grant_types_supported: vec![
            GRANT_AUTHORIZATION_CODE.to_string(),
            GRANT_REFRESH_TOKEN.to_string(),
        ],
        response_types_supported: vec!["code".to_string()],
        response_modes_supported: vec!["query".to_string()],
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
        ],
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        code_challenge_methods_supported: vec!["plain".to_string(), "S256".to_string()],
    };

    tracing::debug!("Serving provider metadata");
    Json(metadata)
}

/// Handler for `GET /.well-known/openid-configuration/jwks`
pub async fn jwks_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.credential.jwks())
}
