//! Identity, access and refresh token issuance and access token validation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use gallery_model::claims::{self, scopes};
use jsonwebtoken::{Algorithm, Validation};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{OAuthError, Result};
use crate::grants::{RefreshTokenGrant, ReferenceToken};
use crate::model::{AccessTokenType, Client, TestUser};
use crate::AppState;

/// Identity provider name stamped into tokens for local logins
pub const LOCAL_IDP: &str = "local";

/// Who the tokens are for and what was granted
pub struct GrantContext<'a> {
    pub client: &'a Client,
    pub user: &'a TestUser,
    pub scopes: &'a [String],
    pub session_id: &'a str,
    pub auth_time: DateTime<Utc>,
    pub nonce: Option<&'a str>,
    /// Expiry of the refresh token being rotated, if any
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Result of a successful grant
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub expires_in: u64,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Issue the tokens a grant entitles the client to
pub fn issue(state: &AppState, ctx: &GrantContext<'_>) -> Result<IssuedTokens> {
    let resources = state
        .store
        .resolve_scopes(ctx.scopes.iter().map(String::as_str))
        .map_err(|scope| OAuthError::InvalidScope(format!("unknown scope: {}", scope)))?;

    let now = Utc::now();
    let lifetime = ctx.client.access_token_lifetime;
    let expires_at = now + Duration::seconds(lifetime as i64);

    // Access token
    let mut access_claims = Map::new();
    access_claims.insert("iss".into(), json!(state.issuer()));
    access_claims.insert("nbf".into(), json!(now.timestamp()));
    access_claims.insert("iat".into(), json!(now.timestamp()));
    access_claims.insert("exp".into(), json!(expires_at.timestamp()));
    let audiences: Vec<String> = resources
        .apis
        .iter()
        .map(|api| api.name.clone())
        .chain(std::iter::once(format!("{}/resources", state.issuer())))
        .collect();
    access_claims.insert("aud".into(), json!(audiences));
    access_claims.insert(claims::CLIENT_ID.into(), json!(ctx.client.client_id));
    access_claims.insert(claims::SUBJECT.into(), json!(ctx.user.subject_id));
    access_claims.insert("auth_time".into(), json!(ctx.auth_time.timestamp()));
    access_claims.insert("idp".into(), json!(LOCAL_IDP));
    access_claims.insert("jti".into(), json!(uuid::Uuid::new_v4().simple().to_string()));
    access_claims.insert(claims::SCOPE.into(), json!(ctx.scopes));
    for claim_type in resources.api_claim_types() {
        if let Some(value) = claim_value(ctx.user.claim_values(claim_type)) {
            access_claims.insert(claim_type.to_string(), value);
        }
    }

    let access_token = match ctx.client.access_token_type {
        AccessTokenType::Jwt => state.credential.sign(&access_claims)?,
        AccessTokenType::Reference => state.grants.store_reference_token(ReferenceToken {
            client_id: ctx.client.client_id.clone(),
            claims: access_claims,
            expires_at,
        }),
    };

    // Identity token
    let id_token = if resources.has_identity(scopes::OPENID) {
        let mut id_claims = Map::new();
        id_claims.insert("iss".into(), json!(state.issuer()));
        id_claims.insert("aud".into(), json!(ctx.client.client_id));
        id_claims.insert(claims::SUBJECT.into(), json!(ctx.user.subject_id));
        id_claims.insert("nbf".into(), json!(now.timestamp()));
        id_claims.insert("iat".into(), json!(now.timestamp()));
        id_claims.insert(
            "exp".into(),
            json!(now.timestamp() + ctx.client.identity_token_lifetime as i64),
        );
        id_claims.insert("auth_time".into(), json!(ctx.auth_time.timestamp()));
        id_claims.insert("idp".into(), json!(LOCAL_IDP));
        id_claims.insert("sid".into(), json!(ctx.session_id));
        id_claims.insert("at_hash".into(), json!(left_half_hash(&access_token)));
        if let Some(nonce) = ctx.nonce {
            id_claims.insert("nonce".into(), json!(nonce));
        }
        Some(state.credential.sign(&id_claims)?)
    } else {
        None
    };

    // Refresh token
    let refresh_token = if resources.offline_access {
        let expires_at = ctx.refresh_expires_at.unwrap_or_else(|| {
            now + Duration::seconds(ctx.client.absolute_refresh_token_lifetime as i64)
        });
        Some(state.grants.store_refresh_token(RefreshTokenGrant {
            client_id: ctx.client.client_id.clone(),
            subject_id: ctx.user.subject_id.clone(),
            scopes: ctx.scopes.to_vec(),
            session_id: ctx.session_id.to_string(),
            auth_time: ctx.auth_time,
            expires_at,
            created_at: now,
        }))
    } else {
        None
    };

    tracing::info!(
        client_id = %ctx.client.client_id,
        sub = %ctx.user.subject_id,
        token_type = ?ctx.client.access_token_type,
        refresh = refresh_token.is_some(),
        "Issued tokens"
    );

    Ok(IssuedTokens {
        access_token,
        expires_in: lifetime,
        id_token,
        refresh_token,
        scope: ctx.scopes.join(" "),
    })
}

/// Resolve an access token (JWT or reference) to its claims
pub fn validate_access_token(state: &AppState, token: &str) -> Option<Map<String, Value>> {
    if token.split('.').count() == 3 {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[state.issuer()]);
        validation.validate_aud = false;
        match state.credential.verify::<Map<String, Value>>(token, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Rejected JWT access token: {}", e);
                None
            }
        }
    } else {
        state.grants.find_reference_token(token).map(|t| t.claims)
    }
}

/// Verify an identity token we issued, ignoring its expiry (used as a logout hint)
pub fn validate_id_token_hint(state: &AppState, token: &str) -> Option<Map<String, Value>> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[state.issuer()]);
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    state
        .credential
        .verify::<Map<String, Value>>(token, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Scopes listed in an access token's `scope` claim
pub fn token_scopes(claims: &Map<String, Value>) -> Vec<String> {
    match claims.get(claims::SCOPE) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// One value becomes a string claim, several become an array
pub fn claim_value(values: Vec<&str>) -> Option<Value> {
    match values.len() {
        0 => None,
        1 => Some(json!(values[0])),
        _ => Some(json!(values)),
    }
}

/// `at_hash`: base64url of the left half of SHA-256(access token)
fn left_half_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}
