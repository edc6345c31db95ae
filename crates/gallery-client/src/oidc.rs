//! OpenID Connect sign-in
//!
//! The challenge sends the browser to the provider's authorize endpoint with
//! a fresh `state`, `nonce` and PKCE verifier kept server side. The callback
//! redeems the code, validates the identity token, pulls the remaining claims
//! from userinfo and opens the cookie session.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use gallery_model::claims;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{ClientError, Result};
use crate::session::{
    generate_random_string, session_cookie, AuthSession, Claim, Principal, StoredTokens,
};
use crate::AppState;

pub const SIGNIN_CALLBACK_PATH: &str = "/signin-oidc";
pub const SIGNOUT_CALLBACK_PATH: &str = "/signout-callback-oidc";

/// Claims dropped from the principal: protocol plumbing plus `sid` and `idp`
const DELETED_CLAIMS: &[&str] = &[
    "nonce", "aud", "azp", "acr", "iss", "iat", "nbf", "exp", "at_hash", "c_hash", "s_hash",
    "auth_time", "ipaddr", "platf", "ver", "sid", "idp",
];

/// Userinfo keys copied into the principal unless already present
const MAPPED_USERINFO_KEYS: &[&str] = &[
    claims::SUBJECT,
    "name",
    claims::GIVEN_NAME,
    claims::FAMILY_NAME,
    "profile",
    "email",
    claims::ROLE,
    claims::COUNTRY,
    claims::SUBSCRIPTION_LEVEL,
];

/// A sign-in that was started but not completed yet
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    pub nonce: String,
    pub code_verifier: String,
    pub return_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ChallengeStore {
    pending: RwLock<HashMap<String, PendingChallenge>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, state: String, challenge: PendingChallenge) {
        self.pending.write().unwrap().insert(state, challenge);
    }

    /// Remove and return the challenge for `state` if it has not expired
    pub fn take(&self, state: &str) -> Option<PendingChallenge> {
        self.pending
            .write()
            .unwrap()
            .remove(state)
            .filter(|c| c.expires_at > Utc::now())
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.pending
            .write()
            .unwrap()
            .retain(|_, c| c.expires_at > now);
    }
}

/// S256 code challenge for a PKCE verifier
pub fn pkce_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// Start a sign-in: remember the challenge and redirect to the provider
pub async fn challenge(state: &AppState, return_url: &str) -> Result<Redirect> {
    let metadata = state.provider.discover().await?;

    let csrf_state = generate_random_string(32);
    let nonce = generate_random_string(32);
    let code_verifier = generate_random_string(64);

    let mut url = Url::parse(&metadata.authorization_endpoint)
        .map_err(|e| ClientError::Discovery(format!("bad authorization endpoint: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", state.provider.client_id())
        .append_pair("redirect_uri", &state.redirect_uri())
        .append_pair("scope", &state.config.scopes.join(" "))
        .append_pair("state", &csrf_state)
        .append_pair("nonce", &nonce)
        .append_pair("code_challenge", &pkce_challenge(&code_verifier))
        .append_pair("code_challenge_method", "S256")
        .append_pair("response_mode", "query");

    state.challenges.insert(
        csrf_state,
        PendingChallenge {
            nonce,
            code_verifier,
            return_url: return_url.to_string(),
            expires_at: Utc::now() + Duration::seconds(state.config.challenge_lifetime_secs as i64),
        },
    );

    tracing::debug!(return_url, "Challenging anonymous request");
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /signin-oidc - Complete the sign-in started by [`challenge`]
pub async fn signin_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        return Err(ClientError::SignIn(format!("{} {}", error, description)));
    }

    let pending = query
        .state
        .as_deref()
        .and_then(|s| state.challenges.take(s))
        .ok_or_else(|| ClientError::SignIn("unknown or expired state".into()))?;
    let code = query
        .code
        .ok_or_else(|| ClientError::SignIn("missing authorization code".into()))?;

    let metadata = state.provider.discover().await?;
    let tokens = state
        .provider
        .exchange_code(&metadata, &code, &state.redirect_uri(), &pending.code_verifier)
        .await?;
    let id_token = tokens
        .id_token
        .ok_or_else(|| ClientError::InvalidIdToken("token response has no id_token".into()))?;

    let id_claims = state
        .provider
        .validate_id_token(&metadata, &id_token, &pending.nonce)
        .await?;
    let userinfo = state
        .provider
        .userinfo(&metadata, &tokens.access_token)
        .await?;
    if userinfo.get(claims::SUBJECT) != id_claims.get(claims::SUBJECT) {
        return Err(ClientError::UserInfo("subject does not match identity token".into()));
    }

    let principal = build_principal(&id_claims, &userinfo);
    let now = Utc::now();
    let session = AuthSession {
        principal,
        tokens: StoredTokens {
            id_token,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: now + Duration::seconds(tokens.expires_in),
        },
        created_at: now,
    };
    let subject = session.principal.subject().unwrap_or_default().to_string();
    let handle = state.sessions.create(session);
    let cookie = session_cookie(handle, &state.config.session);

    tracing::info!(sub = %subject, "User signed in");

    let target = if is_local_url(&pending.return_url) {
        pending.return_url
    } else {
        "/".to_string()
    };
    Ok((
        [(header::SET_COOKIE, cookie.to_string())],
        Redirect::to(&target),
    )
        .into_response())
}

/// Apply the sign-in claim actions.
///
/// Identity token claims are kept under their own names, minus the deleted
/// ones. Mapped userinfo keys are added when the principal does not already
/// carry the same claim.
pub fn build_principal(id_claims: &Map<String, Value>, userinfo: &Map<String, Value>) -> Principal {
    let mut collected = Vec::new();
    for (claim_type, value) in id_claims {
        if DELETED_CLAIMS.contains(&claim_type.as_str()) {
            continue;
        }
        for value in claim_values(value) {
            collected.push(Claim::new(claim_type.clone(), value));
        }
    }

    for key in MAPPED_USERINFO_KEYS {
        let Some(value) = userinfo.get(*key) else {
            continue;
        };
        for value in claim_values(value) {
            let claim = Claim::new(*key, value);
            if !collected.contains(&claim) {
                collected.push(claim);
            }
        }
    }
    Principal::new(collected)
}

/// String values of a JSON claim; arrays become one claim per element
fn claim_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(values) => values.iter().flat_map(claim_values).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Only same-origin paths are followed after sign-in
pub fn is_local_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}
