//! Access token validation against the identity provider
//!
//! JWT access tokens are checked locally with the provider's published
//! signing keys. Anything else is treated as a reference token and resolved
//! through the introspection endpoint with the API's own credentials.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use gallery_model::claims;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{ApiError, Result};

/// The caller, as established by its access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub client_id: Option<String>,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn from_claims(claims: &Map<String, Value>) -> Result<Self> {
        let subject = claims
            .get(claims::SUBJECT)
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Unauthorized("token has no subject".into()))?
            .to_string();

        Ok(Self {
            subject,
            client_id: claims
                .get(claims::CLIENT_ID)
                .and_then(Value::as_str)
                .map(str::to_string),
            roles: string_list(claims.get(claims::ROLE), false),
            scopes: string_list(claims.get(claims::SCOPE), true),
        })
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// A claim that may be a single string or an array of strings
fn string_list(value: Option<&Value>, split_spaces: bool) -> Vec<String> {
    match value {
        Some(Value::String(s)) if split_spaces => {
            s.split_whitespace().map(str::to_string).collect()
        }
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Subset of the discovery document the API needs
#[derive(Debug, Clone, Deserialize)]
struct ProviderMetadata {
    issuer: String,
    jwks_uri: String,
    introspection_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Signing keys fetched from the provider, keyed by `kid`
struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

pub struct TokenValidator {
    http: reqwest::Client,
    authority: String,
    api_name: String,
    api_secret: String,
    refresh_after: Duration,
    metadata: RwLock<Option<ProviderMetadata>>,
    key_cache: RwLock<KeyCache>,
}

impl TokenValidator {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            authority: config.authority.trim_end_matches('/').to_string(),
            api_name: config.api_name.clone(),
            api_secret: config.api_secret.clone(),
            refresh_after: Duration::from_secs(config.jwks_refresh_secs),
            metadata: RwLock::new(None),
            key_cache: RwLock::new(KeyCache {
                keys: HashMap::new(),
                fetched_at: None,
            }),
        }
    }

    /// Validate an access token and return the caller it names
    pub async fn validate(&self, token: &str) -> Result<Principal> {
        let claims = if token.split('.').count() == 3 {
            self.validate_jwt(token).await?
        } else {
            self.introspect(token).await?
        };
        Principal::from_claims(&claims)
    }

    async fn validate_jwt(&self, token: &str) -> Result<Map<String, Value>> {
        let header = decode_header(token)
            .map_err(|e| ApiError::Unauthorized(format!("malformed token: {}", e)))?;
        if header.alg != Algorithm::RS256 {
            return Err(ApiError::Unauthorized(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ApiError::Unauthorized("token has no key id".into()))?;

        let metadata = self.metadata().await?;
        let key = self.signing_key(&metadata, &kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&metadata.issuer]);
        validation.set_audience(&[&self.api_name]);

        let data = decode::<Map<String, Value>>(token, &key, &validation)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
        Ok(data.claims)
    }

    async fn introspect(&self, token: &str) -> Result<Map<String, Value>> {
        let metadata = self.metadata().await?;

        let response = self
            .http
            .post(&metadata.introspection_endpoint)
            .basic_auth(&self.api_name, Some(&self.api_secret))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("introspection request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "introspection answered {}",
                response.status()
            )));
        }

        let body: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid introspection response: {}", e)))?;
        if body.get("active").and_then(Value::as_bool) != Some(true) {
            return Err(ApiError::Unauthorized("reference token is not active".into()));
        }
        Ok(body)
    }

    /// Discovery document, fetched once
    async fn metadata(&self) -> Result<ProviderMetadata> {
        if let Some(metadata) = self.metadata.read().await.as_ref() {
            return Ok(metadata.clone());
        }

        let url = format!("{}/.well-known/openid-configuration", self.authority);
        let metadata: ProviderMetadata = self.get_json(&url).await?;
        tracing::info!("Loaded provider metadata from {}", url);
        *self.metadata.write().await = Some(metadata.clone());
        Ok(metadata)
    }

    /// Key for `kid`, refetching the key set when the key is unknown or stale
    async fn signing_key(&self, metadata: &ProviderMetadata, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.key_cache.read().await;
            let fresh = cache
                .fetched_at
                .is_some_and(|at| at.elapsed() < self.refresh_after);
            if let (true, Some(key)) = (fresh, cache.keys.get(kid)) {
                return Ok(key.clone());
            }
        }

        let jwks: JwkSet = self.get_json(&metadata.jwks_uri).await?;
        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) {
                match DecodingKey::from_rsa_components(&n, &e) {
                    Ok(key) => {
                        keys.insert(kid, key);
                    }
                    Err(err) => tracing::warn!(kid, "Skipping unusable signing key: {}", err),
                }
            }
        }
        tracing::debug!("Fetched {} signing keys", keys.len());

        let mut cache = self.key_cache.write().await;
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized(format!("unknown signing key {}", kid)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("GET {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "GET {} answered {}",
                url,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("invalid JSON from {}: {}", url, e)))
    }
}
