//! Bearer token extraction for protected provider endpoints

use axum::http::{header, HeaderMap};
use serde_json::{Map, Value};

use crate::error::{OAuthError, Result};
use crate::tokens;
use crate::AppState;

/// Pull the token out of an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the request's bearer token (form field as fallback) to its claims
pub fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    form_token: Option<&str>,
) -> Result<Map<String, Value>> {
    let token = bearer_token(headers)
        .or(form_token)
        .ok_or_else(|| {
            tracing::debug!("No bearer token present");
            OAuthError::InvalidToken("access token is missing".into())
        })?;

    tokens::validate_access_token(state, token).ok_or_else(|| {
        tracing::debug!("Invalid or expired token");
        OAuthError::InvalidToken("access token is invalid or expired".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
