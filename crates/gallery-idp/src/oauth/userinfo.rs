//! UserInfo Endpoint
//!
//! Returns the identity claims the access token's scopes grant, always
//! including `sub`. Claims with several values are returned as arrays.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use gallery_model::claims::{self, scopes};
use serde_json::{json, Map, Value};

use crate::error::{OAuthError, Result};
use crate::oauth::bearer;
use crate::tokens::{claim_value, token_scopes};
use crate::AppState;

/// Handler for `GET|POST /connect/userinfo`
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match userinfo(&state, &headers) {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::info!(error = e.code(), "UserInfo request failed: {}", e.description());
            e.into_response()
        }
    }
}

fn userinfo(state: &AppState, headers: &HeaderMap) -> Result<Map<String, Value>> {
    let token_claims = bearer::authenticate(state, headers, None)?;

    let granted = token_scopes(&token_claims);
    if !granted.iter().any(|s| s == scopes::OPENID) {
        return Err(OAuthError::InsufficientScope(
            "access token lacks the openid scope".into(),
        ));
    }

    let subject = token_claims
        .get(claims::SUBJECT)
        .and_then(Value::as_str)
        .ok_or_else(|| OAuthError::InvalidToken("access token has no subject".into()))?;
    let user = state
        .users
        .find_by_subject(subject)
        .ok_or_else(|| OAuthError::InvalidToken("subject no longer exists".into()))?;

    // Unknown scopes (API names) are simply not identity resources
    let identity: Vec<String> = state
        .store
        .identity_resources()
        .into_iter()
        .filter(|r| granted.contains(&r.name))
        .flat_map(|r| r.user_claims)
        .collect();

    let mut body = Map::new();
    body.insert(claims::SUBJECT.into(), json!(user.subject_id));
    for claim_type in identity {
        if body.contains_key(&claim_type) {
            continue;
        }
        if let Some(value) = claim_value(user.claim_values(&claim_type)) {
            body.insert(claim_type, value);
        }
    }

    tracing::debug!(sub = %user.subject_id, claims = body.len(), "Serving userinfo");
    Ok(body)
}
