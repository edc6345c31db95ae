//! Calls to the identity provider
//!
//! Discovery is fetched for every operation that needs an endpoint, so a
//! provider that cannot be reached fails the operation instead of being
//! papered over. Signing keys for identity tokens are cached by `kid` and
//! refetched when an unknown key shows up.

use std::collections::HashMap;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{ClientError, Result};

/// The parts of the discovery document the client uses
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub end_session_endpoint: String,
    pub revocation_endpoint: String,
    pub jwks_uri: String,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
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

pub struct OidcProvider {
    http: reqwest::Client,
    authority: String,
    client_id: String,
    client_secret: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl OidcProvider {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            authority: config.authority.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Fetch the discovery document
    pub async fn discover(&self) -> Result<ProviderMetadata> {
        let url = format!("{}/.well-known/openid-configuration", self.authority);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Discovery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Discovery(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| ClientError::Discovery(e.to_string()))?;
        if metadata.issuer.trim_end_matches('/') != self.authority {
            return Err(ClientError::Discovery(format!(
                "issuer {} does not match authority {}",
                metadata.issuer, self.authority
            )));
        }
        Ok(metadata)
    }

    /// Redeem an authorization code
    pub async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        self.token_request(
            metadata,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", code_verifier),
            ],
        )
        .await
    }

    /// Trade a refresh token for a fresh set of tokens
    pub async fn refresh(
        &self,
        metadata: &ProviderMetadata,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        self.token_request(
            metadata,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn token_request(
        &self,
        metadata: &ProviderMetadata,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&metadata.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| ClientError::TokenEndpoint(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = match response.json::<ErrorResponse>().await {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => format!("token endpoint answered {}", status),
            };
            return Err(ClientError::TokenEndpoint(reason));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::TokenEndpoint(format!("invalid token response: {}", e)))
    }

    /// Claims the userinfo endpoint returns for `access_token`
    pub async fn userinfo(
        &self,
        metadata: &ProviderMetadata,
        access_token: &str,
    ) -> Result<Map<String, Value>> {
        let response = self
            .http
            .get(&metadata.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::UserInfo(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::UserInfo(format!(
                "userinfo answered {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::UserInfo(e.to_string()))
    }

    /// Revoke an access or refresh token
    pub async fn revoke(
        &self,
        metadata: &ProviderMetadata,
        token: &str,
        token_type_hint: &str,
    ) -> Result<()> {
        let response = self
            .http
            .post(&metadata.revocation_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token), ("token_type_hint", token_type_hint)])
            .send()
            .await
            .map_err(|e| ClientError::Revocation(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Revocation(format!(
                "revocation of {} answered {}",
                token_type_hint,
                response.status()
            )));
        }
        tracing::debug!(kind = token_type_hint, "Revoked token");
        Ok(())
    }

    /// Verify an identity token issued to this client and return its claims
    pub async fn validate_id_token(
        &self,
        metadata: &ProviderMetadata,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<Map<String, Value>> {
        let header =
            decode_header(id_token).map_err(|e| ClientError::InvalidIdToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(ClientError::InvalidIdToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ClientError::InvalidIdToken("token has no key id".into()))?;
        let key = self.signing_key(metadata, &kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&metadata.issuer]);
        validation.set_audience(&[&self.client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<Map<String, Value>>(id_token, &key, &validation)
            .map_err(|e| ClientError::InvalidIdToken(e.to_string()))?
            .claims;

        if claims.get("nonce").and_then(Value::as_str) != Some(expected_nonce) {
            return Err(ClientError::InvalidIdToken("nonce mismatch".into()));
        }
        Ok(claims)
    }

    async fn signing_key(&self, metadata: &ProviderMetadata, kid: &str) -> Result<DecodingKey> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        let jwks: JwkSet = self
            .http
            .get(&metadata.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = self.keys.write().await;
        keys.clear();
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
        keys.get(kid)
            .cloned()
            .ok_or_else(|| ClientError::InvalidIdToken(format!("unknown signing key {}", kid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_optional_fields() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3600,"token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(response.access_token, "a");
        assert_eq!(response.expires_in, 3600);
        assert!(response.id_token.is_none());
        assert!(response.refresh_token.is_none());
    }
}
