//! Cookie sessions of signed-in users
//!
//! The browser only holds an opaque handle; the principal and the tokens
//! saved at sign-in live in memory, keyed by the handle's hash.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use gallery_model::claims;
use sha2::{Digest, Sha256};

use crate::config::SessionConfig;
use crate::oidc;
use crate::AppState;

pub const SESSION_COOKIE_NAME: &str = ".gallery.session";

/// A single claim of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// The signed-in user, as the claims gathered at sign-in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    claims: Vec<Claim>,
}

impl Principal {
    pub fn new(claims: Vec<Claim>) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.has_claim(claims::ROLE, role)
    }

    pub fn subject(&self) -> Option<&str> {
        self.find_first(claims::SUBJECT)
    }

    /// Display name, taken from `given_name`
    pub fn name(&self) -> Option<&str> {
        self.find_first(claims::GIVEN_NAME)
    }
}

/// Tokens saved at sign-in and replaced on every refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub principal: Principal,
    pub tokens: StoredTokens,
    pub created_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, AuthSession>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime: Duration::seconds(lifetime_secs as i64),
        }
    }

    /// Start a session and return the handle for the cookie
    pub fn create(&self, session: AuthSession) -> String {
        let handle = generate_handle();
        self.sessions
            .write()
            .unwrap()
            .insert(hash_handle(&handle), session);
        handle
    }

    pub fn get(&self, handle: &str) -> Option<AuthSession> {
        let sessions = self.sessions.read().unwrap();
        sessions
            .get(&hash_handle(handle))
            .filter(|s| s.created_at + self.lifetime > Utc::now())
            .cloned()
    }

    /// Replace the tokens of a live session; false when the session is gone
    pub fn store_tokens(&self, handle: &str, tokens: StoredTokens) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&hash_handle(handle)) {
            Some(session) => {
                session.tokens = tokens;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, handle: &str) -> Option<AuthSession> {
        self.sessions.write().unwrap().remove(&hash_handle(handle))
    }

    pub fn cleanup_expired(&self) {
        let cutoff = Utc::now() - self.lifetime;
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.created_at > cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!("Removed {} expired sessions", removed);
        }
    }
}

/// Extractor for requests from a signed-in user.
///
/// Anonymous requests are answered with the sign-in challenge, which sends
/// the browser to the provider and back to the requested page.
pub struct SignedIn {
    pub handle: String,
    pub session: AuthSession,
}

impl FromRequestParts<Arc<AppState>> for SignedIn {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let signed_in = session_cookie_value(&parts.headers)
            .and_then(|handle| state.sessions.get(&handle).map(|s| (handle, s)));
        if let Some((handle, session)) = signed_in {
            return Ok(SignedIn { handle, session });
        }

        let return_url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        match oidc::challenge(state, return_url).await {
            Ok(redirect) => Err(redirect.into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}

pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;

    cookie_str
        .split(';')
        .filter_map(|part| Cookie::parse(part.trim()).ok())
        .find(|c| c.name() == SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
}

pub fn session_cookie(value: String, config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookie)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(config.session_lifetime_secs as i64))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

/// Random URL-safe string for session handles, state and nonces
pub fn generate_random_string(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn generate_handle() -> String {
    generate_random_string(48)
}

fn hash_handle(handle: &str) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    URL_SAFE_NO_PAD.encode(Sha256::digest(handle.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn session(created_at: DateTime<Utc>) -> AuthSession {
        AuthSession {
            principal: Principal::new(vec![
                Claim::new("sub", "88421113"),
                Claim::new("given_name", "Claire"),
                Claim::new("role", "PayingUser"),
            ]),
            tokens: StoredTokens {
                id_token: "id".into(),
                access_token: "access".into(),
                refresh_token: Some("refresh".into()),
                expires_at: created_at + Duration::hours(1),
            },
            created_at,
        }
    }

    #[test]
    fn test_principal_lookups() {
        let principal = session(Utc::now()).principal;
        assert_eq!(principal.subject(), Some("88421113"));
        assert_eq!(principal.name(), Some("Claire"));
        assert!(principal.is_in_role("PayingUser"));
        assert!(!principal.is_in_role("FreeUser"));
    }

    #[test]
    fn test_create_get_remove() {
        let store = SessionStore::new(3600);
        let handle = store.create(session(Utc::now()));

        assert!(store.get(&handle).is_some());
        assert!(store.get("unknown").is_none());
        assert!(store.remove(&handle).is_some());
        assert!(store.get(&handle).is_none());
    }

    #[test]
    fn test_store_tokens_replaces_tokens() {
        let store = SessionStore::new(3600);
        let handle = store.create(session(Utc::now()));

        let mut tokens = store.get(&handle).unwrap().tokens;
        tokens.access_token = "renewed".into();
        assert!(store.store_tokens(&handle, tokens));
        assert_eq!(store.get(&handle).unwrap().tokens.access_token, "renewed");

        store.remove(&handle);
        assert!(!store.store_tokens(&handle, session(Utc::now()).tokens));
    }

    #[test]
    fn test_expired_sessions() {
        let store = SessionStore::new(3600);
        let handle = store.create(session(Utc::now() - Duration::hours(2)));
        assert!(store.get(&handle).is_none());

        store.cleanup_expired();
        assert!(store.remove(&handle).is_none());
    }

    #[test]
    fn test_session_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; .gallery.session=handle; b=2"),
        );
        assert_eq!(session_cookie_value(&headers).as_deref(), Some("handle"));
    }
}
