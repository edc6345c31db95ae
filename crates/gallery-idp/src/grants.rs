//! Operational store: authorization codes, refresh tokens, reference tokens
//! and login sessions.
//!
//! Everything here is short-lived and kept in memory only; a restart signs
//! every user out and invalidates outstanding grants. Raw handles are never
//! stored, only their hashes.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::storage::{generate_random_string, hash_token};

/// A pending authorization code
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub client_id: String,
    pub subject_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub session_id: String,
    pub auth_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A refresh token grant
#[derive(Debug, Clone)]
pub struct RefreshTokenGrant {
    pub client_id: String,
    pub subject_id: String,
    pub scopes: Vec<String>,
    pub session_id: String,
    pub auth_time: DateTime<Utc>,
    /// Absolute expiry, carried over unchanged when the token is rotated
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A reference (opaque) access token and the claims it stands for
#[derive(Debug, Clone)]
pub struct ReferenceToken {
    pub client_id: String,
    pub claims: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
}

/// A signed-in browser session at the provider
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Session id, published as `sid` in identity tokens
    pub session_id: String,
    pub subject_id: String,
    pub auth_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct GrantStore {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenGrant>>,
    reference_tokens: RwLock<HashMap<String, ReferenceToken>>,
    sessions: RwLock<HashMap<String, LoginSession>>,
}

impl GrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Authorization Codes ---

    /// Store a code and return its handle
    pub fn store_code(&self, code: AuthorizationCode) -> String {
        let handle = generate_random_string(43);
        self.codes.write().unwrap().insert(hash_token(&handle), code);
        handle
    }

    /// Consume an authorization code (returns and removes it)
    pub fn consume_code(&self, handle: &str) -> Option<AuthorizationCode> {
        let mut codes = self.codes.write().unwrap();
        codes
            .remove(&hash_token(handle))
            .filter(|c| c.expires_at > Utc::now())
    }

    // --- Refresh Tokens ---

    pub fn store_refresh_token(&self, grant: RefreshTokenGrant) -> String {
        let handle = generate_random_string(48);
        self.refresh_tokens
            .write()
            .unwrap()
            .insert(hash_token(&handle), grant);
        handle
    }

    /// Look up a live refresh token without consuming it
    pub fn find_refresh_token(&self, handle: &str) -> Option<RefreshTokenGrant> {
        let tokens = self.refresh_tokens.read().unwrap();
        tokens
            .get(&hash_token(handle))
            .filter(|t| t.expires_at > Utc::now())
            .cloned()
    }

    /// Remove a refresh token; returns the grant if it was live
    pub fn remove_refresh_token(&self, handle: &str) -> Option<RefreshTokenGrant> {
        let mut tokens = self.refresh_tokens.write().unwrap();
        tokens
            .remove(&hash_token(handle))
            .filter(|t| t.expires_at > Utc::now())
    }

    // --- Reference Tokens ---

    pub fn store_reference_token(&self, token: ReferenceToken) -> String {
        let handle = generate_random_string(64);
        self.reference_tokens
            .write()
            .unwrap()
            .insert(hash_token(&handle), token);
        handle
    }

    pub fn find_reference_token(&self, handle: &str) -> Option<ReferenceToken> {
        let tokens = self.reference_tokens.read().unwrap();
        tokens
            .get(&hash_token(handle))
            .filter(|t| t.expires_at > Utc::now())
            .cloned()
    }

    pub fn remove_reference_token(&self, handle: &str) -> Option<ReferenceToken> {
        self.reference_tokens
            .write()
            .unwrap()
            .remove(&hash_token(handle))
    }

    // --- Login Sessions ---

    /// Start a session for `subject_id`; returns the cookie value and the session
    pub fn create_session(&self, subject_id: &str, lifetime_secs: u64) -> (String, LoginSession) {
        let cookie_value = generate_random_string(48);
        let now = Utc::now();
        let session = LoginSession {
            session_id: generate_random_string(32),
            subject_id: subject_id.to_string(),
            auth_time: now,
            expires_at: now + Duration::seconds(lifetime_secs as i64),
        };
        self.sessions
            .write()
            .unwrap()
            .insert(hash_token(&cookie_value), session.clone());
        (cookie_value, session)
    }

    pub fn validate_session(&self, cookie_value: &str) -> Option<LoginSession> {
        let sessions = self.sessions.read().unwrap();
        sessions
            .get(&hash_token(cookie_value))
            .filter(|s| s.expires_at > Utc::now())
            .cloned()
    }

    pub fn revoke_session(&self, cookie_value: &str) -> bool {
        self.sessions
            .write()
            .unwrap()
            .remove(&hash_token(cookie_value))
            .is_some()
    }

    /// Drop every expired entry
    pub fn cleanup_expired(&self) {
        let now = Utc::now();

        let codes = {
            let mut codes = self.codes.write().unwrap();
            let before = codes.len();
            codes.retain(|_, c| c.expires_at > now);
            before - codes.len()
        };
        let refresh = {
            let mut tokens = self.refresh_tokens.write().unwrap();
            let before = tokens.len();
            tokens.retain(|_, t| t.expires_at > now);
            before - tokens.len()
        };
        let reference = {
            let mut tokens = self.reference_tokens.write().unwrap();
            let before = tokens.len();
            tokens.retain(|_, t| t.expires_at > now);
            before - tokens.len()
        };
        let sessions = {
            let mut sessions = self.sessions.write().unwrap();
            let before = sessions.len();
            sessions.retain(|_, s| s.expires_at > now);
            before - sessions.len()
        };

        if codes + refresh + reference + sessions > 0 {
            tracing::info!(
                codes,
                refresh,
                reference,
                sessions,
                "Cleaned up expired grants"
            );
        }
    }
}
