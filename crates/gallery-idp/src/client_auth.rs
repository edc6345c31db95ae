//! Client and API authentication at the back-channel endpoints
//!
//! Credentials come either from an HTTP Basic `Authorization` header
//! (`client_secret_basic`) or from the form body (`client_secret_post`).
//! Clients without registered secrets are public and authenticate by id.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{OAuthError, Result};
use crate::model::{ApiResource, Client};
use crate::AppState;

/// Credentials presented with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedCredentials {
    pub id: String,
    pub secret: Option<String>,
}

/// Extract credentials, preferring the Basic header over form fields
pub fn presented_credentials(
    headers: &HeaderMap,
    form_id: Option<&str>,
    form_secret: Option<&str>,
) -> Result<PresentedCredentials> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| OAuthError::InvalidClient("malformed Authorization header".into()))?;
        if let Some(encoded) = value.strip_prefix("Basic ") {
            return parse_basic(encoded.trim());
        }
    }

    match form_id {
        Some(id) if !id.is_empty() => Ok(PresentedCredentials {
            id: id.to_string(),
            secret: form_secret.map(str::to_string),
        }),
        _ => Err(OAuthError::InvalidClient("client credentials are missing".into())),
    }
}

fn parse_basic(encoded: &str) -> Result<PresentedCredentials> {
    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| OAuthError::InvalidClient("malformed Basic credentials".into()))?;
    let (id, secret) = decoded
        .split_once(':')
        .ok_or_else(|| OAuthError::InvalidClient("malformed Basic credentials".into()))?;
    Ok(PresentedCredentials {
        id: id.to_string(),
        secret: Some(secret.to_string()),
    })
}

/// Authenticate a registered client
pub fn authenticate_client(
    state: &AppState,
    headers: &HeaderMap,
    form_id: Option<&str>,
    form_secret: Option<&str>,
) -> Result<Client> {
    let presented = presented_credentials(headers, form_id, form_secret)?;
    let client = state
        .store
        .find_client(&presented.id)
        .ok_or_else(|| OAuthError::InvalidClient("unknown client".into()))?;

    if client.is_public() {
        return Ok(client);
    }

    match presented.secret.as_deref() {
        Some(secret) if client.verify_secret(secret) => Ok(client),
        _ => {
            tracing::warn!(client_id = %client.client_id, "Client secret validation failed");
            Err(OAuthError::InvalidClient("invalid client secret".into()))
        }
    }
}

/// Authenticate a protected API (introspection callers)
pub fn authenticate_api(
    state: &AppState,
    headers: &HeaderMap,
    form_id: Option<&str>,
    form_secret: Option<&str>,
) -> Result<ApiResource> {
    let presented = presented_credentials(headers, form_id, form_secret)?;
    let api = state
        .store
        .find_api_resource(&presented.id)
        .ok_or_else(|| OAuthError::InvalidClient("unknown api".into()))?;

    let secret = presented.secret.unwrap_or_default();
    if api.api_secrets.iter().any(|s| s.matches(&secret)) {
        Ok(api)
    } else {
        tracing::warn!(api = %api.name, "API secret validation failed");
        Err(OAuthError::InvalidClient("invalid api secret".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_basic_header_wins_over_form() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("imagegalleryclient:secret");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );

        let creds = presented_credentials(&headers, Some("other"), None).unwrap();
        assert_eq!(creds.id, "imagegalleryclient");
        assert_eq!(creds.secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_form_credentials() {
        let creds = presented_credentials(&HeaderMap::new(), Some("c"), Some("s")).unwrap();
        assert_eq!(creds.id, "c");
        assert_eq!(creds.secret.as_deref(), Some("s"));

        let creds = presented_credentials(&HeaderMap::new(), Some("c"), None).unwrap();
        assert_eq!(creds.secret, None);
    }

    #[test]
    fn test_missing_credentials() {
        let err = presented_credentials(&HeaderMap::new(), None, None).unwrap_err();
        assert_eq!(err.code(), "invalid_client");
    }

    #[test]
    fn test_malformed_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(presented_credentials(&headers, None, None).is_err());
    }
}
