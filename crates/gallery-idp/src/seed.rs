//! Built-in configuration written to an empty store on first start

use gallery_model::claims::{self, scopes};
use gallery_model::endpoints;

use crate::model::{
    AccessTokenType, ApiResource, Claim, Client, IdentityResource, Secret, TestUser,
    GRANT_AUTHORIZATION_CODE,
};

/// Public origin of the gallery web client
const GALLERY_CLIENT_URL: &str = endpoints::CLIENT_URL;

pub fn identity_resources() -> Vec<IdentityResource> {
    let mut openid = IdentityResource::new(scopes::OPENID, "Your user identifier", &[claims::SUBJECT]);
    openid.required = true;

    vec![
        openid,
        IdentityResource::new(
            scopes::PROFILE,
            "User profile",
            &[
                "name",
                claims::FAMILY_NAME,
                claims::GIVEN_NAME,
                "middle_name",
                "nickname",
                "preferred_username",
                "profile",
                "picture",
                "website",
                "gender",
                "birthdate",
                "zoneinfo",
                "locale",
                "updated_at",
            ],
        ),
        IdentityResource::new(scopes::ADDRESS, "Your postal address", &[claims::ADDRESS]),
        IdentityResource::new(scopes::ROLES, "Your role(s)", &[claims::ROLE]),
        IdentityResource::new(scopes::COUNTRY, "The country you're living in", &[claims::COUNTRY]),
        IdentityResource::new(
            scopes::SUBSCRIPTION_LEVEL,
            "Your subscription level",
            &[claims::SUBSCRIPTION_LEVEL],
        ),
    ]
}

pub fn api_resources() -> Vec<ApiResource> {
    vec![ApiResource {
        name: claims::GALLERY_API.to_string(),
        display_name: "Image Gallery API".to_string(),
        user_claims: vec![claims::ROLE.to_string()],
        api_secrets: vec![Secret::hashed("apisecret")],
    }]
}

pub fn clients() -> Vec<Client> {
    vec![Client {
        client_id: "imagegalleryclient".to_string(),
        client_name: "Image Gallery".to_string(),
        allowed_grant_types: vec![GRANT_AUTHORIZATION_CODE.to_string()],
        require_pkce: true,
        allow_plain_text_pkce: false,
        client_secrets: vec![Secret::hashed("secret")],
        redirect_uris: vec![format!("{}/signin-oidc", GALLERY_CLIENT_URL)],
        post_logout_redirect_uris: vec![format!("{}/signout-callback-oidc", GALLERY_CLIENT_URL)],
        allowed_scopes: [
            scopes::OPENID,
            scopes::PROFILE,
            scopes::ADDRESS,
            scopes::ROLES,
            claims::GALLERY_API,
            scopes::COUNTRY,
            scopes::SUBSCRIPTION_LEVEL,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        allow_offline_access: true,
        access_token_type: AccessTokenType::Jwt,
        access_token_lifetime: 3600,
        identity_token_lifetime: 300,
        authorization_code_lifetime: 300,
        absolute_refresh_token_lifetime: 30 * 24 * 3600,
    }]
}

pub fn users() -> Vec<TestUser> {
    vec![
        TestUser {
            subject_id: "818727".to_string(),
            username: "Frank".to_string(),
            password: "password".to_string(),
            claims: vec![
                Claim::new(claims::GIVEN_NAME, "Frank"),
                Claim::new(claims::FAMILY_NAME, "Underwood"),
                Claim::new(claims::ADDRESS, "Main Road 1"),
                Claim::new(claims::ROLE, "FreeUser"),
                Claim::new(claims::COUNTRY, "nl"),
                Claim::new(claims::SUBSCRIPTION_LEVEL, "FreeUser"),
            ],
        },
        TestUser {
            subject_id: "88421113".to_string(),
            username: "Claire".to_string(),
            password: "password".to_string(),
            claims: vec![
                Claim::new(claims::GIVEN_NAME, "Claire"),
                Claim::new(claims::FAMILY_NAME, "Underwood"),
                Claim::new(claims::ADDRESS, "Big Street 2"),
                Claim::new(claims::ROLE, claims::PAYING_USER),
                Claim::new(claims::COUNTRY, "be"),
                Claim::new(claims::SUBSCRIPTION_LEVEL, claims::PAYING_USER),
            ],
        },
    ]
}
