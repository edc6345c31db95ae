//! Gallery pages

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use gallery_model::{claims, validate_title, Image, ImageForCreation, ImageForUpdate};
use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, Result};
use crate::html;
use crate::policy::{require_can_order_frame, require_role};
use crate::session::{clear_session_cookie, SignedIn};
use crate::AppState;

const GALLERY_PATH: &str = "/gallery";

/// GET / and /gallery - the user's images
pub async fn index(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
) -> Result<Html<String>> {
    write_out_identity_information(&signed_in);

    let request = state.api.request(Method::GET, "/api/images");
    let response = state.api.send(&signed_in.handle, request).await?;
    match response.status() {
        status if status.is_success() => {
            let images: Vec<Image> = response.json().await?;
            Ok(Html(html::gallery_page(
                &signed_in.session.principal,
                &images,
                state.api.base_url(),
            )))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::AccessDenied),
        status => Err(ClientError::Api(status)),
    }
}

/// GET /gallery/edit-image/{id}
pub async fn edit_image_form(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
    Path(id): Path<String>,
) -> Result<Html<String>> {
    let request = state.api.request(Method::GET, &format!("/api/images/{}", id));
    let response = ensure_success(state.api.send(&signed_in.handle, request).await?)?;
    let image: Image = response.json().await?;

    Ok(Html(html::edit_image_page(
        &signed_in.session.principal,
        &image.id.to_string(),
        &image.title,
        None,
    )))
}

#[derive(Debug, Deserialize)]
pub struct EditImageForm {
    pub id: String,
    pub title: String,
}

/// POST /gallery/edit-image
pub async fn edit_image(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
    Form(form): Form<EditImageForm>,
) -> Result<Response> {
    if let Err(e) = validate_title(&form.title) {
        let page = html::edit_image_page(
            &signed_in.session.principal,
            &form.id,
            &form.title,
            Some(&e.to_string()),
        );
        return Ok(Html(page).into_response());
    }

    let update = ImageForUpdate {
        title: form.title.trim().to_string(),
    };
    let request = state
        .api
        .request(Method::PUT, &format!("/api/images/{}", form.id))
        .json(&update);
    ensure_success(state.api.send(&signed_in.handle, request).await?)?;

    Ok(Redirect::to(GALLERY_PATH).into_response())
}

/// GET /gallery/delete-image/{id}
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let request = state
        .api
        .request(Method::DELETE, &format!("/api/images/{}", id));
    ensure_success(state.api.send(&signed_in.handle, request).await?)?;
    Ok(Redirect::to(GALLERY_PATH))
}

/// GET /gallery/add-image - paying users only
pub async fn add_image_form(signed_in: SignedIn) -> Result<Html<String>> {
    require_role(&signed_in.session.principal, claims::PAYING_USER)?;
    Ok(Html(html::add_image_page(
        &signed_in.session.principal,
        "",
        None,
    )))
}

/// POST /gallery/add-image - multipart `title` and `file`
pub async fn add_image(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
    mut multipart: Multipart,
) -> Result<Response> {
    let principal = &signed_in.session.principal;
    require_role(principal, claims::PAYING_USER)?;

    let mut title = String::new();
    let mut bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ClientError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                title = field
                    .text()
                    .await
                    .map_err(|e| ClientError::BadRequest(e.to_string()))?;
            }
            // Only the first file is used
            "file" if bytes.is_none() => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ClientError::BadRequest(e.to_string()))?;
                bytes = Some(data.to_vec());
            }
            _ => {}
        }
    }

    if let Err(e) = validate_title(&title) {
        let page = html::add_image_page(principal, &title, Some(&e.to_string()));
        return Ok(Html(page).into_response());
    }
    let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
        let page = html::add_image_page(principal, &title, Some("An image file is required"));
        return Ok(Html(page).into_response());
    };

    let creation = ImageForCreation {
        title: title.trim().to_string(),
        bytes,
    };
    let request = state
        .api
        .request(Method::POST, "/api/images")
        .json(&creation);
    ensure_success(state.api.send(&signed_in.handle, request).await?)?;

    Ok(Redirect::to(GALLERY_PATH).into_response())
}

/// GET /gallery/order-frame - shows the postal address from userinfo
pub async fn order_frame(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
) -> Result<Html<String>> {
    let principal = &signed_in.session.principal;
    require_can_order_frame(principal)?;

    let access_token = state.api.access_token(&signed_in.handle).await?;
    let metadata = state.provider.discover().await?;
    let userinfo = state.provider.userinfo(&metadata, &access_token).await?;
    let address = userinfo.get(claims::ADDRESS).and_then(|v| v.as_str());

    Ok(Html(html::order_frame_page(principal, address)))
}

/// GET /gallery/logout
///
/// Revokes both tokens at the provider, drops the local session and hands
/// the browser to the provider's end-session endpoint.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    signed_in: SignedIn,
) -> Result<Response> {
    let metadata = state.provider.discover().await?;
    let tokens = &signed_in.session.tokens;

    state
        .provider
        .revoke(&metadata, &tokens.access_token, "access_token")
        .await?;
    if let Some(refresh_token) = &tokens.refresh_token {
        state
            .provider
            .revoke(&metadata, refresh_token, "refresh_token")
            .await?;
    }

    state.sessions.remove(&signed_in.handle);
    tracing::info!(
        sub = signed_in.session.principal.subject().unwrap_or_default(),
        "User signed out"
    );

    let mut end_session = Url::parse(&metadata.end_session_endpoint)
        .map_err(|e| ClientError::Discovery(format!("bad end session endpoint: {}", e)))?;
    end_session
        .query_pairs_mut()
        .append_pair("id_token_hint", &tokens.id_token)
        .append_pair("post_logout_redirect_uri", &state.post_logout_redirect_uri());

    Ok((
        [(header::SET_COOKIE, clear_session_cookie().to_string())],
        Redirect::to(end_session.as_str()),
    )
        .into_response())
}

/// GET /signout-callback-oidc
pub async fn signout_callback() -> Redirect {
    Redirect::to("/")
}

/// GET /authorization/access-denied
pub async fn access_denied() -> Html<String> {
    Html(html::access_denied_page())
}

fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Api(status))
    }
}

fn write_out_identity_information(signed_in: &SignedIn) {
    tracing::trace!("Identity token {}", signed_in.session.tokens.id_token);
    for claim in signed_in.session.principal.claims() {
        tracing::debug!("Claim type={} value={}", claim.claim_type, claim.value);
    }
}
