//! Token Endpoint
//!
//! Handles:
//! - Authorization code exchange (with PKCE verification)
//! - Refresh token grants, rotating the refresh token on every use

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Form, Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::client_auth::authenticate_client;
use crate::error::{OAuthError, Result};
use crate::model::{Client, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};
use crate::tokens::{self, GrantContext, IssuedTokens};
use crate::AppState;

const CODE_VERIFIER_MIN_LEN: usize = 43;
const CODE_VERIFIER_MAX_LEN: usize = 128;

/// Token request (form-encoded)
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    /// "authorization_code" or "refresh_token"
    pub grant_type: Option<String>,

    /// Authorization code (for authorization_code grant)
    pub code: Option<String>,

    /// Must match the redirect URI of the authorize request
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (for authorization_code grant)
    pub code_verifier: Option<String>,

    /// Refresh token (for refresh_token grant)
    pub refresh_token: Option<String>,

    /// Optional narrower scope (for refresh_token grant)
    pub scope: Option<String>,

    /// Client credentials when not sent as Basic auth
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Successful token response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(issued: IssuedTokens) -> Self {
        Self {
            id_token: issued.id_token,
            access_token: issued.access_token,
            expires_in: issued.expires_in,
            token_type: "Bearer",
            refresh_token: issued.refresh_token,
            scope: issued.scope,
        }
    }
}

/// Handler for `POST /connect/token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    match process(&state, &headers, &request) {
        Ok(issued) => (
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(TokenResponse::from(issued)),
        )
            .into_response(),
        Err(e) => {
            tracing::info!(error = e.code(), "Token request failed: {}", e.description());
            e.into_response()
        }
    }
}

fn process(state: &AppState, headers: &HeaderMap, request: &TokenRequest) -> Result<IssuedTokens> {
    let grant_type = request
        .grant_type
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("grant_type is required".into()))?;

    let client = authenticate_client(
        state,
        headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )?;

    match grant_type {
        GRANT_AUTHORIZATION_CODE => handle_authorization_code(state, &client, request),
        GRANT_REFRESH_TOKEN => handle_refresh_token(state, &client, request),
        other => Err(OAuthError::UnsupportedGrantType(format!(
            "grant type not supported: {}",
            other
        ))),
    }
}

/// Handle authorization_code grant
fn handle_authorization_code(
    state: &AppState,
    client: &Client,
    request: &TokenRequest,
) -> Result<IssuedTokens> {
    if !client.allows_grant(GRANT_AUTHORIZATION_CODE) {
        return Err(OAuthError::UnauthorizedClient(
            "client is not allowed the authorization code grant".into(),
        ));
    }

    let code = request
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;
    let redirect_uri = request
        .redirect_uri
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("redirect_uri is required".into()))?;

    // Consumed up front so a failed exchange cannot be retried
    let auth_code = state
        .grants
        .consume_code(code)
        .ok_or_else(|| OAuthError::InvalidGrant("invalid authorization code".into()))?;

    if auth_code.client_id != client.client_id {
        tracing::warn!(
            client_id = %client.client_id,
            "Authorization code presented by a different client"
        );
        return Err(OAuthError::InvalidGrant("invalid authorization code".into()));
    }
    if auth_code.redirect_uri != redirect_uri {
        return Err(OAuthError::InvalidGrant("redirect_uri does not match".into()));
    }

    match (&auth_code.code_challenge, request.code_verifier.as_deref()) {
        (Some(challenge), Some(verifier)) => {
            let method = auth_code.code_challenge_method.as_deref().unwrap_or("plain");
            if !verify_pkce(challenge, method, verifier) {
                return Err(OAuthError::InvalidGrant(
                    "code_verifier does not match code_challenge".into(),
                ));
            }
        }
        (Some(_), None) => {
            return Err(OAuthError::InvalidGrant("code_verifier is required".into()))
        }
        (None, Some(_)) => {
            return Err(OAuthError::InvalidGrant("unexpected code_verifier".into()))
        }
        (None, None) => {}
    }

    let user = state
        .users
        .find_by_subject(&auth_code.subject_id)
        .ok_or_else(|| OAuthError::InvalidGrant("user no longer exists".into()))?;

    tokens::issue(
        state,
        &GrantContext {
            client,
            user,
            scopes: &auth_code.scopes,
            session_id: &auth_code.session_id,
            auth_time: auth_code.auth_time,
            nonce: auth_code.nonce.as_deref(),
            refresh_expires_at: None,
        },
    )
}

/// Handle refresh_token grant
fn handle_refresh_token(
    state: &AppState,
    client: &Client,
    request: &TokenRequest,
) -> Result<IssuedTokens> {
    if !client.allow_offline_access {
        return Err(OAuthError::UnauthorizedClient(
            "client is not allowed refresh tokens".into(),
        ));
    }

    let handle = request
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".into()))?;

    let grant = state
        .grants
        .find_refresh_token(handle)
        .ok_or_else(|| OAuthError::InvalidGrant("invalid refresh token".into()))?;
    if grant.client_id != client.client_id {
        tracing::warn!(
            client_id = %client.client_id,
            "Refresh token presented by a different client"
        );
        return Err(OAuthError::InvalidGrant("invalid refresh token".into()));
    }

    let scopes: Vec<String> = match request.scope.as_deref() {
        Some(scope) => {
            let requested: Vec<String> = scope.split_whitespace().map(str::to_string).collect();
            if let Some(extra) = requested.iter().find(|s| !grant.scopes.contains(s)) {
                return Err(OAuthError::InvalidScope(format!(
                    "scope was not originally granted: {}",
                    extra
                )));
            }
            requested
        }
        None => grant.scopes.clone(),
    };

    let user = state
        .users
        .find_by_subject(&grant.subject_id)
        .ok_or_else(|| OAuthError::InvalidGrant("user no longer exists".into()))?;

    // One-time use: the old handle stops working as soon as it is redeemed
    state
        .grants
        .remove_refresh_token(handle)
        .ok_or_else(|| OAuthError::InvalidGrant("invalid refresh token".into()))?;

    tracing::info!(client_id = %client.client_id, sub = %grant.subject_id, "Refreshing tokens");

    tokens::issue(
        state,
        &GrantContext {
            client,
            user,
            scopes: &scopes,
            session_id: &grant.session_id,
            auth_time: grant.auth_time,
            nonce: None,
            refresh_expires_at: Some(grant.expires_at),
        },
    )
}

/// Verify a PKCE code_verifier against the stored challenge
fn verify_pkce(challenge: &str, method: &str, verifier: &str) -> bool {
    if !(CODE_VERIFIER_MIN_LEN..=CODE_VERIFIER_MAX_LEN).contains(&verifier.len()) {
        return false;
    }

    let computed = match method {
        // S256: BASE64URL(SHA256(code_verifier)) == code_challenge
        "S256" => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
        "plain" => verifier.to_string(),
        _ => return false,
    };
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}
