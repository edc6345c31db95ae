//! RP-Initiated Logout
//!
//! Ends the provider session. When the client identifies itself with an
//! `id_token_hint` and names a registered post-logout redirect URI, the
//! browser is sent back there, or linked to from the signed-out page when
//! automatic redirects are turned off. Otherwise the page has no link.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::account::{html, login};
use crate::tokens;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    pub id_token_hint: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub state: Option<String>,
}

/// Handler for `GET /connect/endsession`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EndSessionRequest>,
    headers: HeaderMap,
) -> Response {
    login::end_session(&state, &headers);
    let clear = [(header::SET_COOKIE, login::clear_session_cookie().to_string())];

    match post_logout_target(&state, &params) {
        Some(target) if state.config.session.automatic_redirect_after_sign_out => {
            tracing::info!("Logged out, returning to {}", target.uri);
            (clear, Redirect::to(&target.uri)).into_response()
        }
        Some(target) => {
            let link = Some((target.uri.as_str(), target.client_name.as_str()));
            (clear, Html(html::signed_out_page(link))).into_response()
        }
        None => (clear, Html(html::signed_out_page(None))).into_response(),
    }
}

/// Where a client asked to be sent after logout
struct PostLogoutTarget {
    uri: String,
    client_name: String,
}

fn post_logout_target(state: &AppState, params: &EndSessionRequest) -> Option<PostLogoutTarget> {
    let requested = params.post_logout_redirect_uri.as_deref()?;
    let hint = params.id_token_hint.as_deref()?;

    let claims = match tokens::validate_id_token_hint(state, hint) {
        Some(c) => c,
        None => {
            tracing::warn!("Ignoring invalid id_token_hint");
            return None;
        }
    };
    let client_id = claims.get("aud").and_then(Value::as_str)?;
    let client = state.store.find_client(client_id)?;
    if !client.has_post_logout_redirect_uri(requested) {
        tracing::warn!(client_id, requested, "Unregistered post_logout_redirect_uri");
        return None;
    }

    let mut url = Url::parse(requested).ok()?;
    if let Some(s) = &params.state {
        url.query_pairs_mut().append_pair("state", s);
    }
    Some(PostLogoutTarget {
        uri: url.to_string(),
        client_name: client.client_name,
    })
}
