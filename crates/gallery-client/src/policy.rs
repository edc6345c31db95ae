//! Authorization policies of the gallery pages

use gallery_model::claims;

use crate::error::{ClientError, Result};
use crate::session::Principal;

/// Ordering a framed print is limited to paying customers in Belgium
pub fn can_order_frame(principal: &Principal) -> bool {
    principal.has_claim(claims::COUNTRY, "be")
        && principal.has_claim(claims::SUBSCRIPTION_LEVEL, claims::PAYING_USER)
}

pub fn require_can_order_frame(principal: &Principal) -> Result<()> {
    if can_order_frame(principal) {
        Ok(())
    } else {
        tracing::info!(sub = principal.subject(), "CanOrderFrame denied");
        Err(ClientError::AccessDenied)
    }
}

pub fn require_role(principal: &Principal, role: &str) -> Result<()> {
    if principal.is_in_role(role) {
        Ok(())
    } else {
        tracing::info!(sub = principal.subject(), role, "Role requirement denied");
        Err(ClientError::AccessDenied)
    }
}
