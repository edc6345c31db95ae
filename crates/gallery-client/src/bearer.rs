//! API client that attaches the signed-in user's access token
//!
//! Before every call the stored expiry is checked. Inside the last minute of
//! the token's life the refresh token is redeemed at the provider and the new
//! tokens replace the old ones in the session, so later requests and later
//! page loads pick them up. Refresh failures are returned to the caller
//! as-is; nothing is retried.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Method, RequestBuilder, Response};

use crate::error::{ClientError, Result};
use crate::provider::{OidcProvider, TokenResponse};
use crate::session::{SessionStore, StoredTokens};

/// Tokens this close to expiry are refreshed before use
pub const REFRESH_WINDOW_SECS: i64 = 60;

/// Whether a token expiring at `expires_at` must be refreshed at `now`
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at - Duration::seconds(REFRESH_WINDOW_SECS)
}

/// New stored tokens from a refresh response.
///
/// Tokens the response omits keep their previous value.
pub fn merge_refreshed(
    previous: &StoredTokens,
    response: TokenResponse,
    now: DateTime<Utc>,
) -> StoredTokens {
    StoredTokens {
        id_token: response
            .id_token
            .unwrap_or_else(|| previous.id_token.clone()),
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| previous.refresh_token.clone()),
        expires_at: now + Duration::seconds(response.expires_in),
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    provider: Arc<OidcProvider>,
    sessions: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        provider: Arc<OidcProvider>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider,
            sessions,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request builder for an API path such as `/api/images`
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::ACCEPT, "application/json")
    }

    /// Send `request` on behalf of the session behind `handle`
    pub async fn send(&self, handle: &str, request: RequestBuilder) -> Result<Response> {
        let access_token = self.access_token(handle).await?;
        let request = if access_token.trim().is_empty() {
            request
        } else {
            request.bearer_auth(access_token)
        };
        Ok(request.send().await?)
    }

    /// The session's access token, refreshed first when it is about to expire
    pub async fn access_token(&self, handle: &str) -> Result<String> {
        let session = self.sessions.get(handle).ok_or(ClientError::NotSignedIn)?;
        let now = Utc::now();
        if !needs_refresh(session.tokens.expires_at, now) {
            return Ok(session.tokens.access_token);
        }

        let refresh_token = session
            .tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| ClientError::TokenEndpoint("no refresh token stored".into()))?;
        let metadata = self.provider.discover().await?;
        let response = self.provider.refresh(&metadata, refresh_token).await?;

        let renewed = merge_refreshed(&session.tokens, response, Utc::now());
        let access_token = renewed.access_token.clone();
        if self.sessions.store_tokens(handle, renewed) {
            tracing::info!(
                sub = session.principal.subject().unwrap_or_default(),
                "Refreshed access token"
            );
        } else {
            tracing::warn!("Session ended while its tokens were refreshed");
        }
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(expires_at: DateTime<Utc>) -> StoredTokens {
        StoredTokens {
            id_token: "old-id".into(),
            access_token: "old-access".into(),
            refresh_token: Some("old-refresh".into()),
            expires_at,
        }
    }

    #[test]
    fn test_refresh_window() {
        let now = Utc::now();
        assert!(!needs_refresh(now + Duration::seconds(61), now));
        assert!(needs_refresh(now + Duration::seconds(60), now));
        assert!(needs_refresh(now + Duration::seconds(59), now));
        assert!(needs_refresh(now - Duration::seconds(5), now));
    }

    #[test]
    fn test_merge_replaces_all_tokens() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "new-access".into(),
            expires_in: 3600,
            id_token: Some("new-id".into()),
            refresh_token: Some("new-refresh".into()),
            scope: None,
        };

        let merged = merge_refreshed(&stored(now), response, now);
        assert_eq!(merged.id_token, "new-id");
        assert_eq!(merged.access_token, "new-access");
        assert_eq!(merged.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(merged.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_merge_keeps_omitted_tokens() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "new-access".into(),
            expires_in: 120,
            id_token: None,
            refresh_token: None,
            scope: None,
        };

        let merged = merge_refreshed(&stored(now), response, now);
        assert_eq!(merged.id_token, "old-id");
        assert_eq!(merged.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(merged.access_token, "new-access");
    }
}
