//! Claim, scope and role names used across the gallery services

pub const SUBJECT: &str = "sub";
pub const ROLE: &str = "role";
pub const COUNTRY: &str = "country";
pub const SUBSCRIPTION_LEVEL: &str = "subscriptionlevel";
pub const GIVEN_NAME: &str = "given_name";
pub const FAMILY_NAME: &str = "family_name";
pub const ADDRESS: &str = "address";
pub const SCOPE: &str = "scope";
pub const CLIENT_ID: &str = "client_id";

/// Name of the API resource protecting `/api/images`
pub const GALLERY_API: &str = "imagegalleryapi";

/// Role (and subscription level) of paying customers
pub const PAYING_USER: &str = "PayingUser";

pub mod scopes {
    pub const OPENID: &str = "openid";
    pub const PROFILE: &str = "profile";
    pub const ADDRESS: &str = "address";
    pub const ROLES: &str = "roles";
    pub const COUNTRY: &str = "country";
    pub const SUBSCRIPTION_LEVEL: &str = "subscriptionlevel";
    pub const OFFLINE_ACCESS: &str = "offline_access";
}
