use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::html;

pub const ACCESS_DENIED_PATH: &str = "/authorization/access-denied";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to get discovery document: {0}")]
    Discovery(String),

    #[error("token request failed: {0}")]
    TokenEndpoint(String),

    #[error("invalid identity token: {0}")]
    InvalidIdToken(String),

    #[error("sign-in failed: {0}")]
    SignIn(String),

    #[error("failed to get user info from IDP: {0}")]
    UserInfo(String),

    #[error("failed to revoke token: {0}")]
    Revocation(String),

    /// The API answered with an unexpected status
    #[error("problem accessing API: {0}")]
    Api(StatusCode),

    #[error("access denied")]
    AccessDenied,

    /// The session behind the cookie is gone
    #[error("not signed in")]
    NotSignedIn,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        match self {
            ClientError::AccessDenied => Redirect::to(ACCESS_DENIED_PATH).into_response(),
            ClientError::NotSignedIn => Redirect::to("/").into_response(),
            ClientError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, Html(html::error_page(&reason))).into_response()
            }
            other => {
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(html::error_page(&other.to_string())),
                )
                    .into_response()
            }
        }
    }
}
