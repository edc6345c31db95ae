//! `/api/images` endpoints and the image file route

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gallery_model::{claims, validate_title, Image, ImageForCreation, ImageForUpdate};

use crate::authorization::{must_own_image, require_role, AuthenticatedUser};
use crate::error::{ApiError, Result};
use crate::AppState;

/// GET /api/images - the caller's images
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Image>>> {
    let images = state.repository.images_for_owner(&user.subject).await?;
    Ok(Json(images.into_iter().map(Image::from).collect()))
}

/// GET /api/images/{id}
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Image>> {
    let id = must_own_image(state.repository.as_ref(), &user, &id).await?;
    let image = state
        .repository
        .image(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(image.into()))
}

/// POST /api/images - paying users only
pub async fn create_image(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<ImageForCreation>,
) -> Result<Response> {
    require_role(&user, claims::PAYING_USER)?;
    validate_title(&payload.title).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if payload.bytes.is_empty() {
        return Err(ApiError::BadRequest("image bytes are required".into()));
    }

    let record = state
        .repository
        .add_image(&user.subject, payload.title.trim(), &payload.bytes)
        .await?;
    let location = format!("/api/images/{}", record.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(Image::from(record)),
    )
        .into_response())
}

/// PUT /api/images/{id}
pub async fn update_image(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    Json(payload): Json<ImageForUpdate>,
) -> Result<StatusCode> {
    let id = must_own_image(state.repository.as_ref(), &user, &id).await?;
    validate_title(&payload.title).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .repository
        .update_image(id, payload.title.trim())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/images/{id}
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = must_own_image(state.repository.as_ref(), &user, &id).await?;
    state.repository.delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /images/{file} - stored image bytes
pub async fn image_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<Response> {
    let bytes = state
        .repository
        .image_bytes(&file)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}
