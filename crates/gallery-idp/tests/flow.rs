//! End-to-end protocol tests against the provider's router

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonwebtoken::{Algorithm, Validation};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use gallery_idp::config::Config;
use gallery_idp::keys::SigningCredential;
use gallery_idp::storage::ConfigurationStore;
use gallery_idp::{router, AppState};

const ISSUER: &str = "https://idp.test";
const CLIENT_ID: &str = "imagegalleryclient";
const REDIRECT_URI: &str = "http://localhost:44389/signin-oidc";
const POST_LOGOUT_URI: &str = "http://localhost:44389/signout-callback-oidc";
const SCOPES: &str = "openid profile address roles imagegalleryapi country subscriptionlevel offline_access";
// RFC 7636 appendix B
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

struct TestIdp {
    app: Router,
    state: Arc<AppState>,
    _dir: TempDir,
}

impl TestIdp {
    fn new() -> Self {
        Self::build(Config::default(), |_| {})
    }

    fn with_clients(edit: impl FnOnce(&mut Value)) -> Self {
        Self::build(Config::default(), edit)
    }

    /// Start from the seeded configuration with `edit` applied to clients.json
    fn build(config: Config, edit: impl FnOnce(&mut Value)) -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().to_str().unwrap();
        ConfigurationStore::new(config_path).unwrap().initialize().unwrap();

        let clients_file = dir.path().join("clients.json");
        let mut clients: Value =
            serde_json::from_str(&std::fs::read_to_string(&clients_file).unwrap()).unwrap();
        edit(&mut clients);
        std::fs::write(&clients_file, clients.to_string()).unwrap();

        let store = ConfigurationStore::new(config_path).unwrap();
        store.initialize().unwrap();
        let credential =
            SigningCredential::from_pem(include_str!("fixtures/signing_key.pem")).unwrap();
        let state = Arc::new(AppState::new(config, store, credential, ISSUER));
        Self {
            app: router(state.clone()),
            state,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::get(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, pairs: &[(&str, &str)], basic: Option<(&str, &str)>) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some((id, secret)) = basic {
            let encoded = STANDARD.encode(format!("{}:{}", id, secret));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {}", encoded));
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Log a seeded user in and return the session cookie
    async fn login(&self, username: &str) -> String {
        let response = self
            .post_form(
                "/account/login",
                &[("username", username), ("password", "password"), ("return_url", "/")],
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Run the authorize step with an existing session and return the code
    async fn authorize(&self, cookie: &str) -> String {
        let response = self.get(&authorize_uri("xyz"), Some(cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = location(&response);
        assert!(location.starts_with(REDIRECT_URI));
        query_param(&location, "code").expect("code in redirect")
    }

    async fn exchange(&self, code: &str, verifier: &str) -> Response {
        self.post_form(
            "/connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", REDIRECT_URI),
                ("code_verifier", verifier),
            ],
            Some((CLIENT_ID, "secret")),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Response {
        self.post_form(
            "/connect/token",
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
            Some((CLIENT_ID, "secret")),
        )
        .await
    }

    async fn introspect(&self, token: &str) -> Value {
        let response = self
            .post_form(
                "/connect/introspect",
                &[("token", token)],
                Some(("imagegalleryapi", "apisecret")),
            )
            .await;
        json_body(response).await
    }

    fn verify(&self, token: &str) -> Value {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_aud = false;
        self.state.credential.verify::<Value>(token, &validation).unwrap().claims
    }
}

fn authorize_uri(state: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", CLIENT_ID)
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("response_type", "code")
        .append_pair("scope", SCOPES)
        .append_pair("state", state)
        .append_pair("nonce", "n-0S6_WzA2Mj")
        .append_pair("code_challenge", CHALLENGE)
        .append_pair("code_challenge_method", "S256")
        .finish();
    format!("/connect/authorize?{}", query)
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_discovery_document() {
    let idp = TestIdp::new();
    let response = idp.get("/.well-known/openid-configuration", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = json_body(response).await;
    assert_eq!(doc["issuer"], ISSUER);
    assert_eq!(doc["token_endpoint"], "https://idp.test/connect/token");
    assert_eq!(doc["jwks_uri"], "https://idp.test/.well-known/openid-configuration/jwks");
    let scopes: Vec<&str> = doc["scopes_supported"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(scopes.contains(&"imagegalleryapi"));
    assert!(scopes.contains(&"offline_access"));

    let jwks = json_body(idp.get("/.well-known/openid-configuration/jwks", None).await).await;
    assert_eq!(jwks["keys"][0]["kid"], idp.state.credential.key_id());
}

#[tokio::test]
async fn test_unauthenticated_authorize_redirects_to_login() {
    let idp = TestIdp::new();
    let response = idp.get(&authorize_uri("abc"), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with("/account/login?return_url=%2Fconnect%2Fauthorize"));
}

#[tokio::test]
async fn test_login_returns_to_local_url_only() {
    let idp = TestIdp::new();
    let response = idp
        .post_form(
            "/account/login",
            &[
                ("username", "Frank"),
                ("password", "password"),
                ("return_url", "https://evil.example/"),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_wrong_password_shows_error() {
    let idp = TestIdp::new();
    let response = idp
        .post_form(
            "/account/login",
            &[("username", "Frank"), ("password", "nope")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(text_body(response).await.contains("Invalid username or password"));
}

#[tokio::test]
async fn test_unregistered_redirect_uri_is_not_followed() {
    let idp = TestIdp::new();
    let uri = authorize_uri("s").replace("signin-oidc", "elsewhere");
    let response = idp.get(&uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_prompt_none_without_session_reports_login_required() {
    let idp = TestIdp::new();
    let uri = format!("{}&prompt=none", authorize_uri("quiet"));
    let response = idp.get(&uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = location(&response);
    assert!(target.starts_with(REDIRECT_URI));
    assert_eq!(query_param(&target, "error").as_deref(), Some("login_required"));
    assert_eq!(query_param(&target, "state").as_deref(), Some("quiet"));
    assert_eq!(query_param(&target, "code"), None);
}

#[tokio::test]
async fn test_disallowed_scope_is_reported_to_client() {
    let idp = TestIdp::with_clients(|clients| {
        let client = &mut clients["clients"][CLIENT_ID];
        client["allowed_scopes"] = json!(["openid", "profile"]);
    });
    let cookie = idp.login("Frank").await;

    let response = idp.get(&authorize_uri("s2"), Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with(REDIRECT_URI));
    assert_eq!(query_param(&target, "error").as_deref(), Some("invalid_scope"));
    assert_eq!(query_param(&target, "state").as_deref(), Some("s2"));
    assert_eq!(query_param(&target, "code"), None);
}

#[tokio::test]
async fn test_unknown_scope_is_reported_to_client() {
    let idp = TestIdp::new();
    let uri = authorize_uri("s3").replace("offline_access", "weather");
    let response = idp.get(&uri, None).await;
    let target = location(&response);
    assert_eq!(query_param(&target, "error").as_deref(), Some("invalid_scope"));
}

#[tokio::test]
async fn test_missing_pkce_is_reported_to_client() {
    let idp = TestIdp::new();
    let uri = format!(
        "/connect/authorize?client_id={}&redirect_uri={}&response_type=code&scope=openid&state=s1",
        CLIENT_ID,
        url::form_urlencoded::byte_serialize(REDIRECT_URI.as_bytes()).collect::<String>()
    );
    let response = idp.get(&uri, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert_eq!(query_param(&location, "error").as_deref(), Some("invalid_request"));
    assert_eq!(query_param(&location, "state").as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_code_flow_issues_tokens() {
    let idp = TestIdp::new();
    let cookie = idp.login("Frank").await;

    let response = idp.get(&authorize_uri("xyz"), Some(&cookie)).await;
    let redirect = location(&response);
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("xyz"));
    assert_eq!(query_param(&redirect, "iss").as_deref(), Some(ISSUER));
    let code = query_param(&redirect, "code").unwrap();

    let response = idp.exchange(&code, VERIFIER).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let tokens = json_body(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 3600);
    assert!(tokens["refresh_token"].is_string());

    let id_token = idp.verify(tokens["id_token"].as_str().unwrap());
    assert_eq!(id_token["aud"], CLIENT_ID);
    assert_eq!(id_token["sub"], "818727");
    assert_eq!(id_token["nonce"], "n-0S6_WzA2Mj");
    assert!(id_token["sid"].is_string());
    assert!(id_token["at_hash"].is_string());

    let access = idp.verify(tokens["access_token"].as_str().unwrap());
    assert_eq!(access["client_id"], CLIENT_ID);
    assert_eq!(access["role"], "FreeUser");
    let audiences = access["aud"].as_array().unwrap();
    assert!(audiences.iter().any(|a| a == "imagegalleryapi"));
}

#[tokio::test]
async fn test_code_is_single_use_and_needs_verifier() {
    let idp = TestIdp::new();
    let cookie = idp.login("Frank").await;

    let code = idp.authorize(&cookie).await;
    let wrong = idp.exchange(&code, &"x".repeat(43)).await;
    assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(wrong).await["error"], "invalid_grant");

    // The failed attempt consumed the code
    let retry = idp.exchange(&code, VERIFIER).await;
    assert_eq!(json_body(retry).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_wrong_client_secret() {
    let idp = TestIdp::new();
    let response = idp
        .post_form(
            "/connect/token",
            &[("grant_type", "refresh_token"), ("refresh_token", "x")],
            Some((CLIENT_ID, "wrong")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_userinfo_returns_identity_claims() {
    let idp = TestIdp::new();
    let cookie = idp.login("Claire").await;
    let code = idp.authorize(&cookie).await;
    let tokens = json_body(idp.exchange(&code, VERIFIER).await).await;

    let request = Request::get("/connect/userinfo")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", tokens["access_token"].as_str().unwrap()),
        )
        .body(Body::empty())
        .unwrap();
    let response = idp.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let info = json_body(response).await;
    assert_eq!(info["sub"], "88421113");
    assert_eq!(info["given_name"], "Claire");
    assert_eq!(info["address"], "Big Street 2");
    assert_eq!(info["country"], "be");
    assert_eq!(info["subscriptionlevel"], "PayingUser");
    assert_eq!(info["role"], "PayingUser");
}

#[tokio::test]
async fn test_userinfo_rejects_missing_token() {
    let idp = TestIdp::new();
    let response = idp.get("/connect/userinfo", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let idp = TestIdp::new();
    let cookie = idp.login("Frank").await;
    let code = idp.authorize(&cookie).await;
    let first = json_body(idp.exchange(&code, VERIFIER).await).await;
    let old_refresh = first["refresh_token"].as_str().unwrap().to_string();

    let response = idp.refresh(&old_refresh).await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await;
    let new_refresh = second["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, old_refresh);
    assert!(second["access_token"].is_string());
    assert!(second["id_token"].is_string());

    // The old handle is gone
    let replay = idp.refresh(&old_refresh).await;
    assert_eq!(json_body(replay).await["error"], "invalid_grant");

    // The new one works
    assert_eq!(idp.refresh(new_refresh).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_introspection_and_revocation() {
    let idp = TestIdp::new();
    let cookie = idp.login("Frank").await;
    let code = idp.authorize(&cookie).await;
    let tokens = json_body(idp.exchange(&code, VERIFIER).await).await;
    let access = tokens["access_token"].as_str().unwrap();
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = idp
        .post_form(
            "/connect/introspect",
            &[("token", access)],
            Some(("imagegalleryapi", "apisecret")),
        )
        .await;
    let introspected = json_body(response).await;
    assert_eq!(introspected["active"], true);
    assert_eq!(introspected["sub"], "818727");

    let inactive = idp
        .post_form(
            "/connect/introspect",
            &[("token", "garbage")],
            Some(("imagegalleryapi", "apisecret")),
        )
        .await;
    assert_eq!(json_body(inactive).await["active"], false);

    let unauthorized = idp
        .post_form(
            "/connect/introspect",
            &[("token", access)],
            Some(("imagegalleryapi", "wrong")),
        )
        .await;
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let revoked = idp
        .post_form(
            "/connect/revocation",
            &[("token", refresh), ("token_type_hint", "refresh_token")],
            Some((CLIENT_ID, "secret")),
        )
        .await;
    assert_eq!(revoked.status(), StatusCode::OK);
    assert_eq!(json_body(idp.refresh(refresh).await).await["error"], "invalid_grant");

    // Unknown tokens are still a success
    let unknown = idp
        .post_form(
            "/connect/revocation",
            &[("token", "does-not-exist")],
            Some((CLIENT_ID, "secret")),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_endsession_returns_to_client() {
    let idp = TestIdp::new();
    let cookie = idp.login("Frank").await;
    let code = idp.authorize(&cookie).await;
    let tokens = json_body(idp.exchange(&code, VERIFIER).await).await;

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("id_token_hint", tokens["id_token"].as_str().unwrap())
        .append_pair("post_logout_redirect_uri", POST_LOGOUT_URI)
        .append_pair("state", "bye")
        .finish();
    let response = idp
        .get(&format!("/connect/endsession?{}", query), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with(POST_LOGOUT_URI));
    assert_eq!(query_param(&target, "state").as_deref(), Some("bye"));

    // The provider session is gone
    let again = idp.get(&authorize_uri("s"), Some(&cookie)).await;
    assert!(location(&again).starts_with("/account/login"));
}

#[tokio::test]
async fn test_endsession_links_back_when_not_redirecting() {
    let mut config = Config::default();
    config.session.automatic_redirect_after_sign_out = false;
    let idp = TestIdp::build(config, |_| {});
    let cookie = idp.login("Frank").await;
    let code = idp.authorize(&cookie).await;
    let tokens = json_body(idp.exchange(&code, VERIFIER).await).await;

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("id_token_hint", tokens["id_token"].as_str().unwrap())
        .append_pair("post_logout_redirect_uri", POST_LOGOUT_URI)
        .append_pair("state", "bye")
        .finish();
    let response = idp
        .get(&format!("/connect/endsession?{}", query), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::LOCATION).is_none());

    let page = text_body(response).await;
    assert!(page.contains("You are now logged out"));
    assert!(page.contains(&format!("{}?state=bye", POST_LOGOUT_URI)));
    assert!(page.contains("return to Image Gallery"));
}

#[tokio::test]
async fn test_endsession_without_hint_shows_page() {
    let idp = TestIdp::new();
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("post_logout_redirect_uri", POST_LOGOUT_URI)
        .finish();
    let response = idp.get(&format!("/connect/endsession?{}", query), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text_body(response).await.contains("You are now logged out"));
}

#[tokio::test]
async fn test_reference_tokens_are_introspected_and_revoked() {
    let idp = TestIdp::with_clients(|clients| {
        clients["clients"][CLIENT_ID]["access_token_type"] = json!("reference");
    });
    let cookie = idp.login("Claire").await;
    let code = idp.authorize(&cookie).await;
    let tokens = json_body(idp.exchange(&code, VERIFIER).await).await;
    let access = tokens["access_token"].as_str().unwrap();
    assert_eq!(access.split('.').count(), 1, "expected an opaque handle");

    let introspected = idp.introspect(access).await;
    assert_eq!(introspected["active"], true);
    assert_eq!(introspected["sub"], "88421113");
    assert_eq!(introspected["client_id"], CLIENT_ID);
    assert_eq!(introspected["role"], "PayingUser");

    let request = Request::get("/connect/userinfo")
        .header(header::AUTHORIZATION, format!("Bearer {}", access))
        .body(Body::empty())
        .unwrap();
    assert_eq!(idp.send(request).await.status(), StatusCode::OK);

    let revoked = idp
        .post_form(
            "/connect/revocation",
            &[("token", access), ("token_type_hint", "access_token")],
            Some((CLIENT_ID, "secret")),
        )
        .await;
    assert_eq!(revoked.status(), StatusCode::OK);
    assert_eq!(idp.introspect(access).await["active"], false);
}
