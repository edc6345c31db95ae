//! Authorization Endpoint
//!
//! Validates the request, sends unauthenticated users to the login page and
//! answers authenticated ones with an authorization code on the registered
//! redirect URI.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use gallery_model::claims::scopes;
use serde::Deserialize;
use url::Url;

use crate::account::{html, login};
use crate::grants::AuthorizationCode;
use crate::model::{Client, GRANT_AUTHORIZATION_CODE};
use crate::AppState;

const CODE_CHALLENGE_MIN_LEN: usize = 43;
const CODE_CHALLENGE_MAX_LEN: usize = 128;

/// Authorization request parameters
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeRequest {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Only "code" is supported
    pub response_type: Option<String>,
    pub scope: Option<String>,
    /// Client state, echoed back on the redirect
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// "none" forbids showing the login page
    pub prompt: Option<String>,
}

/// An error reported back to the client on its redirect URI
#[derive(Debug)]
struct RedirectError {
    error: &'static str,
    description: String,
}

impl RedirectError {
    fn new(error: &'static str, description: impl Into<String>) -> Self {
        Self {
            error,
            description: description.into(),
        }
    }
}

/// The validated parts of a request
struct ValidatedRequest {
    client: Client,
    redirect_uri: String,
    scopes: Vec<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
}

/// Handler for `GET /connect/authorize`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeRequest>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    // Client and redirect URI must check out before anything is sent back to it
    let (client, redirect_uri) = match validate_client(&state, &params) {
        Ok(v) => v,
        Err(response) => return response,
    };

    let request = match validate_request(&state, client, redirect_uri, &params) {
        Ok(r) => r,
        Err((redirect_uri, e)) => {
            tracing::info!(error = e.error, "Authorize request rejected: {}", e.description);
            return error_redirect(&redirect_uri, &e, params.state.as_deref());
        }
    };

    let session = match login::session_from_headers(&headers, &state) {
        Some(s) => s,
        None if params.prompt.as_deref() == Some("none") => {
            let e = RedirectError::new("login_required", "user is not logged in");
            return error_redirect(&request.redirect_uri, &e, params.state.as_deref());
        }
        None => {
            let return_url = uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string());
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("return_url", &return_url)
                .finish();
            tracing::debug!("No session, redirecting to login");
            return Redirect::to(&format!("/account/login?{}", query)).into_response();
        }
    };

    let now = Utc::now();
    let code = state.grants.store_code(AuthorizationCode {
        client_id: request.client.client_id.clone(),
        subject_id: session.subject_id.clone(),
        redirect_uri: request.redirect_uri.clone(),
        scopes: request.scopes.clone(),
        nonce: params.nonce.clone(),
        code_challenge: request.code_challenge,
        code_challenge_method: request.code_challenge_method,
        session_id: session.session_id.clone(),
        auth_time: session.auth_time,
        expires_at: now + Duration::seconds(request.client.authorization_code_lifetime as i64),
        created_at: now,
    });

    tracing::info!(
        client_id = %request.client.client_id,
        sub = %session.subject_id,
        "Issued authorization code"
    );

    let mut pairs = vec![("code", code), ("scope", request.scopes.join(" "))];
    if let Some(s) = &params.state {
        pairs.push(("state", s.clone()));
    }
    pairs.push(("iss", state.issuer().to_string()));
    match append_query(&request.redirect_uri, &pairs) {
        Some(url) => Redirect::to(&url).into_response(),
        None => error_page("invalid_request", "redirect_uri is not a valid URL"),
    }
}

fn validate_client(
    state: &AppState,
    params: &AuthorizeRequest,
) -> Result<(Client, String), Response> {
    let client_id = params
        .client_id
        .as_deref()
        .ok_or_else(|| error_page("invalid_request", "client_id is missing"))?;
    let client = state
        .store
        .find_client(client_id)
        .ok_or_else(|| error_page("unauthorized_client", "unknown client"))?;

    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .ok_or_else(|| error_page("invalid_request", "redirect_uri is missing"))?;
    if !client.has_redirect_uri(redirect_uri) {
        tracing::warn!(client_id, redirect_uri, "Unregistered redirect_uri");
        return Err(error_page("invalid_request", "invalid redirect_uri"));
    }

    Ok((client, redirect_uri.to_string()))
}

fn validate_request(
    state: &AppState,
    client: Client,
    redirect_uri: String,
    params: &AuthorizeRequest,
) -> Result<ValidatedRequest, (String, RedirectError)> {
    let fail = |e: RedirectError| (redirect_uri.clone(), e);

    match params.response_type.as_deref() {
        Some("code") => {}
        Some(_) => {
            return Err(fail(RedirectError::new(
                "unsupported_response_type",
                "only the code response type is supported",
            )))
        }
        None => return Err(fail(RedirectError::new("invalid_request", "response_type is missing"))),
    }

    if !client.allows_grant(GRANT_AUTHORIZATION_CODE) {
        return Err(fail(RedirectError::new(
            "unauthorized_client",
            "client is not allowed the authorization code flow",
        )));
    }

    let requested: Vec<String> = params
        .scope
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if !requested.iter().any(|s| s == scopes::OPENID) {
        return Err(fail(RedirectError::new("invalid_scope", "the openid scope is required")));
    }
    if let Some(scope) = requested.iter().find(|s| !client.allows_scope(s)) {
        return Err(fail(RedirectError::new(
            "invalid_scope",
            format!("scope not allowed for this client: {}", scope),
        )));
    }
    if let Err(scope) = state.store.resolve_scopes(requested.iter().map(String::as_str)) {
        return Err(fail(RedirectError::new(
            "invalid_scope",
            format!("unknown scope: {}", scope),
        )));
    }

    let (code_challenge, code_challenge_method) =
        validate_pkce(&client, params).map_err(&fail)?;

    Ok(ValidatedRequest {
        client,
        redirect_uri: redirect_uri.clone(),
        scopes: requested,
        code_challenge,
        code_challenge_method,
    })
}

fn validate_pkce(
    client: &Client,
    params: &AuthorizeRequest,
) -> Result<(Option<String>, Option<String>), RedirectError> {
    let challenge = match params.code_challenge.as_deref() {
        Some(c) if !c.is_empty() => c,
        _ if client.require_pkce => {
            return Err(RedirectError::new("invalid_request", "code challenge required"))
        }
        _ => return Ok((None, None)),
    };

    let method = params.code_challenge_method.as_deref().unwrap_or("plain");
    match method {
        "S256" => {}
        "plain" if client.allow_plain_text_pkce => {}
        "plain" => {
            return Err(RedirectError::new(
                "invalid_request",
                "transform algorithm not supported",
            ))
        }
        _ => {
            return Err(RedirectError::new(
                "invalid_request",
                "code_challenge_method must be S256 or plain",
            ))
        }
    }

    if !(CODE_CHALLENGE_MIN_LEN..=CODE_CHALLENGE_MAX_LEN).contains(&challenge.len()) {
        return Err(RedirectError::new("invalid_request", "invalid code_challenge length"));
    }

    Ok((Some(challenge.to_string()), Some(method.to_string())))
}

fn append_query(base: &str, pairs: &[(&str, String)]) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    Some(url.to_string())
}

fn error_redirect(redirect_uri: &str, e: &RedirectError, state: Option<&str>) -> Response {
    let mut pairs = vec![
        ("error", e.error.to_string()),
        ("error_description", e.description.clone()),
    ];
    if let Some(s) = state {
        pairs.push(("state", s.to_string()));
    }
    match append_query(redirect_uri, &pairs) {
        Some(url) => Redirect::to(&url).into_response(),
        None => error_page(e.error, &e.description),
    }
}

fn error_page(error: &str, description: &str) -> Response {
    tracing::info!(error, "Authorize request cannot be redirected: {}", description);
    (StatusCode::BAD_REQUEST, Html(html::error_page(error, description))).into_response()
}
