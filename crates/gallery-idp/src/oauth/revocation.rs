//! RFC 7009: Token Revocation
//!
//! Accepts refresh tokens and reference access tokens. Self-contained JWT
//! access tokens cannot be revoked and are accepted silently. Per the RFC the
//! endpoint answers 200 for unknown tokens too.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;

use crate::client_auth::authenticate_client;
use crate::error::OAuthError;
use crate::model::Client;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RevocationRequest {
    pub token: Option<String>,
    /// "access_token" or "refresh_token"; only a lookup hint
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Handler for `POST /connect/revocation`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<RevocationRequest>,
) -> Response {
    let client = match authenticate_client(
        &state,
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    ) {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let token = match request.token.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => return OAuthError::InvalidRequest("token is required".into()).into_response(),
    };

    match request.token_type_hint.as_deref() {
        None | Some("access_token") | Some("refresh_token") => {}
        Some(_) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({ "error": "unsupported_token_type" })),
            )
                .into_response()
        }
    }

    let revoked = if request.token_type_hint.as_deref() == Some("access_token") {
        revoke_reference_token(&state, &client, token) || revoke_refresh_token(&state, &client, token)
    } else {
        revoke_refresh_token(&state, &client, token) || revoke_reference_token(&state, &client, token)
    };

    tracing::info!(client_id = %client.client_id, revoked, "Processed revocation request");
    StatusCode::OK.into_response()
}

fn revoke_refresh_token(state: &AppState, client: &Client, token: &str) -> bool {
    match state.grants.find_refresh_token(token) {
        Some(grant) if grant.client_id == client.client_id => {
            state.grants.remove_refresh_token(token);
            true
        }
        Some(_) => {
            tracing::warn!(client_id = %client.client_id, "Refusing to revoke another client's refresh token");
            false
        }
        None => false,
    }
}

fn revoke_reference_token(state: &AppState, client: &Client, token: &str) -> bool {
    match state.grants.find_reference_token(token) {
        Some(t) if t.client_id == client.client_id => {
            state.grants.remove_reference_token(token);
            true
        }
        Some(_) => {
            tracing::warn!(client_id = %client.client_id, "Refusing to revoke another client's access token");
            false
        }
        None => false,
    }
}
