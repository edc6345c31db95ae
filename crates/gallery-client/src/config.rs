//! Configuration loading and management

use std::path::Path;

use anyhow::{Context, Result};
use gallery_model::claims::{self, scopes};
use gallery_model::endpoints;
use serde::{Deserialize, Serialize};

/// Main configuration for the gallery web client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the identity provider
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Our client registration at the provider
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_client_secret")]
    pub client_secret: String,

    /// Scopes requested on sign-in
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Base URL of the image API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub session: SessionConfig,

    /// How long a sign-in may take before its state is forgotten, in seconds
    #[serde(default = "default_challenge_lifetime")]
    pub challenge_lifetime_secs: u64,

    /// How often expired sessions and challenges are swept, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie session lifetime in seconds (default: 10 hours)
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_secs: u64,

    /// Whether the session cookie is marked `Secure`
    #[serde(default = "default_true")]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: default_session_lifetime(),
            secure_cookie: true,
        }
    }
}

fn default_authority() -> String {
    endpoints::IDP_URL.to_string()
}

fn default_client_id() -> String {
    "imagegalleryclient".to_string()
}

fn default_client_secret() -> String {
    "secret".to_string()
}

fn default_scopes() -> Vec<String> {
    [
        scopes::OPENID,
        scopes::PROFILE,
        scopes::ADDRESS,
        scopes::ROLES,
        claims::GALLERY_API,
        scopes::COUNTRY,
        scopes::SUBSCRIPTION_LEVEL,
        scopes::OFFLINE_ACCESS,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_api_base_url() -> String {
    endpoints::API_URL.to_string()
}

fn default_session_lifetime() -> u64 {
    10 * 3600
}

fn default_challenge_lifetime() -> u64 {
    15 * 60
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            client_id: default_client_id(),
            client_secret: default_client_secret(),
            scopes: default_scopes(),
            api_base_url: default_api_base_url(),
            session: SessionConfig::default(),
            challenge_lifetime_secs: default_challenge_lifetime(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            let config = Config::default();
            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_scopes() {
        let config = Config::default();
        assert_eq!(
            config.scopes.join(" "),
            "openid profile address roles imagegalleryapi country subscriptionlevel offline_access"
        );
    }

    #[test]
    fn test_defaults_point_at_local_services() {
        let config = Config::default();
        let api = url::Url::parse(&config.api_base_url).unwrap();
        assert_eq!(api.scheme(), "http");
        assert_eq!(api.port(), Some(endpoints::API_PORT));

        let authority = url::Url::parse(&config.authority).unwrap();
        assert_eq!(authority.port(), Some(endpoints::IDP_PORT));
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();

        let config = Config::load(path).unwrap();
        assert_eq!(config.client_id, "imagegalleryclient");
        assert!(dir.path().join("config.json").exists());
    }

    #[test]
    fn test_partial_config_uses_field_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "api_base_url": "https://api.test", "session": { "secure_cookie": false } }"#,
        )
        .unwrap();

        let config = Config::load(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api_base_url, "https://api.test");
        assert!(!config.session.secure_cookie);
        assert_eq!(config.session.session_lifetime_secs, 10 * 3600);
        assert_eq!(config.client_secret, "secret");
    }
}
