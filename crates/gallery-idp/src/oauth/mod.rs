//! OpenID Connect and OAuth 2.0 protocol endpoints
//!
//! Implements:
//! - OpenID Connect Discovery 1.0 and the JWKS document
//! - Authorization Code flow with PKCE (RFC 7636)
//! - Refresh token grant with rotation
//! - UserInfo
//! - RFC 7009: Token Revocation
//! - RFC 7662: Token Introspection
//! - RP-Initiated Logout

pub mod authorize;
pub mod bearer;
pub mod discovery;
pub mod endsession;
pub mod introspection;
pub mod revocation;
pub mod token;
pub mod userinfo;
