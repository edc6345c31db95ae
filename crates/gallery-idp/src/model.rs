//! Configuration records: clients, resources and users
//!
//! These are pure data. The provider reads them from the configuration store
//! and never mutates them while serving requests.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::storage::hash_token;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// A single user claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
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

/// A hashed shared secret (client or API secret)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    /// Hash of the secret, as produced by [`hash_token`]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Secret {
    /// Build a secret from its plain text value
    pub fn hashed(plain: &str) -> Self {
        Self {
            value: hash_token(plain),
            description: None,
        }
    }

    /// Compare a presented plain text secret with this one
    pub fn matches(&self, presented: &str) -> bool {
        let presented = hash_token(presented);
        presented.as_bytes().ct_eq(self.value.as_bytes()).into()
    }
}

/// A named group of user claims a client can request through a scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResource {
    pub name: String,
    pub display_name: String,
    pub user_claims: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

impl IdentityResource {
    pub fn new(name: &str, display_name: &str, user_claims: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            user_claims: user_claims.iter().map(|c| c.to_string()).collect(),
            required: false,
        }
    }
}

/// A protected API; its name doubles as scope and access token audience
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResource {
    pub name: String,
    pub display_name: String,
    /// User claims copied into access tokens issued for this API
    #[serde(default)]
    pub user_claims: Vec<String>,
    /// Secrets the API uses to call the introspection endpoint
    #[serde(default)]
    pub api_secrets: Vec<Secret>,
}

/// How access tokens are handed to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenType {
    /// Self-contained signed JWT
    #[default]
    Jwt,
    /// Opaque handle resolved through introspection
    Reference,
}

/// A registered relying party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub client_name: String,
    pub allowed_grant_types: Vec<String>,
    #[serde(default = "default_true")]
    pub require_pkce: bool,
    #[serde(default)]
    pub allow_plain_text_pkce: bool,
    #[serde(default)]
    pub client_secrets: Vec<Secret>,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    #[serde(default)]
    pub allow_offline_access: bool,
    #[serde(default)]
    pub access_token_type: AccessTokenType,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: u64,
    #[serde(default = "default_identity_token_lifetime")]
    pub identity_token_lifetime: u64,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: u64,
    #[serde(default = "default_absolute_refresh_token_lifetime")]
    pub absolute_refresh_token_lifetime: u64,
}

impl Client {
    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.allowed_grant_types.iter().any(|g| g == grant_type)
    }

    /// `offline_access` is governed by `allow_offline_access`, not by the scope list
    pub fn allows_scope(&self, scope: &str) -> bool {
        if scope == gallery_model::claims::scopes::OFFLINE_ACCESS {
            return self.allow_offline_access;
        }
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|r| r == uri)
    }

    pub fn has_post_logout_redirect_uri(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|r| r == uri)
    }

    /// Clients without secrets are public and authenticate by id alone
    pub fn is_public(&self) -> bool {
        self.client_secrets.is_empty()
    }

    pub fn verify_secret(&self, presented: &str) -> bool {
        self.client_secrets.iter().any(|s| s.matches(presented))
    }
}

/// A local user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestUser {
    pub subject_id: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl TestUser {
    /// Values of every claim of the given type
    pub fn claim_values(&self, claim_type: &str) -> Vec<&str> {
        self.claims
            .iter()
            .filter(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
            .collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_access_token_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_identity_token_lifetime() -> u64 {
    300 // 5 minutes
}

fn default_authorization_code_lifetime() -> u64 {
    300 // 5 minutes
}

fn default_absolute_refresh_token_lifetime() -> u64 {
    30 * 24 * 3600 // 30 days
}
