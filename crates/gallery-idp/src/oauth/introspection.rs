//! RFC 7662: Token Introspection
//!
//! Called by protected APIs with their own credentials. A token is only
//! reported active to an API that is one of its audiences.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::client_auth::authenticate_api;
use crate::error::OAuthError;
use crate::tokens;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IntrospectionRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Handler for `POST /connect/introspect`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(request): Form<IntrospectionRequest>,
) -> Response {
    let api = match authenticate_api(
        &state,
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    ) {
        Ok(api) => api,
        Err(e) => return e.into_response(),
    };

    let token = match request.token.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => return OAuthError::InvalidRequest("token is required".into()).into_response(),
    };

    let claims = tokens::validate_access_token(&state, token)
        .filter(|claims| has_audience(claims, &api.name));

    match claims {
        Some(claims) => {
            tracing::debug!(api = %api.name, "Introspected active token");
            Json(active_response(claims)).into_response()
        }
        None => {
            tracing::debug!(api = %api.name, "Introspected inactive token");
            Json(json!({ "active": false })).into_response()
        }
    }
}

fn has_audience(claims: &Map<String, Value>, audience: &str) -> bool {
    match claims.get("aud") {
        Some(Value::String(aud)) => aud == audience,
        Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(audience)),
        _ => false,
    }
}

fn active_response(mut claims: Map<String, Value>) -> Map<String, Value> {
    // Scopes are space-delimited in introspection responses
    if let Some(Value::Array(values)) = claims.get("scope") {
        let joined = values
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        claims.insert("scope".into(), json!(joined));
    }
    claims.insert("active".into(), json!(true));
    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_audience() {
        let mut claims = Map::new();
        claims.insert("aud".into(), json!(["imagegalleryapi", "https://idp/resources"]));
        assert!(has_audience(&claims, "imagegalleryapi"));
        assert!(!has_audience(&claims, "otherapi"));

        claims.insert("aud".into(), json!("imagegalleryapi"));
        assert!(has_audience(&claims, "imagegalleryapi"));
    }

    #[test]
    fn test_active_response_joins_scopes() {
        let mut claims = Map::new();
        claims.insert("scope".into(), json!(["openid", "imagegalleryapi"]));
        let response = active_response(claims);
        assert_eq!(response["active"], true);
        assert_eq!(response["scope"], "openid imagegalleryapi");
    }
}
