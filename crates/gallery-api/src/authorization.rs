//! Request authentication and the API's authorization rules

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::{ApiError, Result};
use crate::repository::GalleryRepository;
use crate::AppState;

/// Extractor for a caller with a valid bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let principal = state.validator.validate(token).await?;
        tracing::debug!(sub = %principal.subject, "Authenticated request");
        Ok(AuthenticatedUser(principal))
    }
}

/// The caller must own the image named by the route id.
///
/// Ids that are not UUIDs are refused outright, same as foreign images.
pub async fn must_own_image(
    repository: &dyn GalleryRepository,
    principal: &Principal,
    id: &str,
) -> Result<Uuid> {
    let id = Uuid::parse_str(id)
        .map_err(|_| ApiError::Forbidden(format!("{} is not an image id", id)))?;

    if !repository.is_image_owner(id, &principal.subject).await? {
        return Err(ApiError::Forbidden(format!(
            "{} does not own image {}",
            principal.subject, id
        )));
    }
    Ok(id)
}

pub fn require_role(principal: &Principal, role: &str) -> Result<()> {
    if principal.is_in_role(role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} is not in role {}",
            principal.subject, role
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FileGalleryRepository;
    use tempfile::TempDir;

    fn principal(sub: &str, roles: &[&str]) -> Principal {
        Principal {
            subject: sub.to_string(),
            client_id: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            scopes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_must_own_image() {
        let dir = TempDir::new().unwrap();
        let repo = FileGalleryRepository::open(dir.path()).await.unwrap();
        let image = repo.add_image("818727", "Mine", b"x").await.unwrap();
        let id = image.id.to_string();

        let frank = principal("818727", &[]);
        let claire = principal("88421113", &[]);
        assert_eq!(must_own_image(&repo, &frank, &id).await.unwrap(), image.id);
        assert!(matches!(
            must_own_image(&repo, &claire, &id).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            must_own_image(&repo, &frank, "not-a-guid").await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(&principal("1", &["PayingUser"]), "PayingUser").is_ok());
        assert!(require_role(&principal("1", &["FreeUser"]), "PayingUser").is_err());
    }
}
