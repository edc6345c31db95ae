//! Login and logout for local accounts

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use cookie::{Cookie, SameSite};
use serde::Deserialize;

use crate::config::SessionConfig;
use crate::grants::LoginSession;
use crate::AppState;

use super::html;

pub const SESSION_COOKIE_NAME: &str = "idp.session";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Where to continue after login, usually the pending authorize request
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub return_url: Option<String>,
}

/// GET /account/login - Show login page
pub async fn get_login(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(html::login_page(query.return_url.as_deref(), "", None))
}

/// POST /account/login - Check credentials and start a session
pub async fn post_login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match state.users.validate_credentials(&form.username, &form.password) {
        Some(u) => u,
        None => {
            tracing::info!(username = %form.username, "Invalid login attempt");
            return Html(html::login_page(
                form.return_url.as_deref(),
                &form.username,
                Some("Invalid username or password"),
            ))
            .into_response();
        }
    };

    let (cookie_value, session) = state
        .grants
        .create_session(&user.subject_id, state.config.session.session_lifetime_secs);
    let cookie = session_cookie(cookie_value, &state.config.session);

    let redirect_to = form
        .return_url
        .filter(|r| is_local_url(r))
        .unwrap_or_else(|| "/".to_string());

    tracing::info!(
        sub = %user.subject_id,
        sid = %session.session_id,
        "User {} logged in",
        user.username
    );

    (
        [(header::SET_COOKIE, cookie.to_string())],
        Redirect::to(&redirect_to),
    )
        .into_response()
}

/// GET /account/logout - End the provider session
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    end_session(&state, &headers);
    (
        [(header::SET_COOKIE, clear_session_cookie().to_string())],
        Html(html::signed_out_page(None)),
    )
        .into_response()
}

/// GET / - Provider landing page
pub async fn home(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Html<String> {
    let username = session_from_headers(&headers, &state)
        .and_then(|s| state.users.find_by_subject(&s.subject_id))
        .map(|u| u.username.as_str());
    Html(html::home_page(username))
}

/// Revoke the session named by the request's cookie, if any
pub fn end_session(state: &AppState, headers: &HeaderMap) -> Option<LoginSession> {
    let cookie_value = session_cookie_value(headers)?;
    let session = state.grants.validate_session(&cookie_value);
    state.grants.revoke_session(&cookie_value);
    if let Some(s) = &session {
        tracing::info!(sub = %s.subject_id, sid = %s.session_id, "Session ended");
    }
    session
}

/// Helper to validate the session from request headers
pub fn session_from_headers(headers: &HeaderMap, state: &AppState) -> Option<LoginSession> {
    let cookie_value = session_cookie_value(headers)?;
    state.grants.validate_session(&cookie_value)
}

fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
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
        .same_site(SameSite::Lax) // Sent on top-level redirects back from clients
        .max_age(time::Duration::seconds(config.session_lifetime_secs as i64))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

/// Only same-origin paths are accepted as post-login targets
pub fn is_local_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_local_url() {
        assert!(is_local_url("/connect/authorize?client_id=x"));
        assert!(!is_local_url("//evil.example"));
        assert!(!is_local_url("/\\evil.example"));
        assert!(!is_local_url("https://evil.example"));
    }

    #[test]
    fn test_session_cookie_value_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; idp.session=abc123; x=y"),
        );
        assert_eq!(session_cookie_value(&headers).as_deref(), Some("abc123"));
        assert_eq!(session_cookie_value(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("v".into(), &SessionConfig::default()).to_string();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Lax"));
    }
}
