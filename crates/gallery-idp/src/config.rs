//! Configuration loading and management

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::TestUser;
use crate::seed;

/// Main configuration for the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local user accounts that can sign in
    #[serde(default = "seed::users")]
    pub users: Vec<TestUser>,

    /// Token signing key
    #[serde(default)]
    pub signing: SigningConfig,

    /// Login session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// How often expired grants are swept, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// PKCS#8 PEM file holding the RSA signing key.
    /// If not set, a developer key is generated into the config directory.
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Login session lifetime in seconds (default: 10 hours)
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime_secs: u64,

    /// Whether the session cookie is marked `Secure`
    #[serde(default = "default_true")]
    pub secure_cookie: bool,

    /// Send the browser straight back to a client's post-logout redirect URI.
    /// When off, the signed-out page links to it instead.
    #[serde(default = "default_true")]
    pub automatic_redirect_after_sign_out: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: default_session_lifetime(),
            secure_cookie: true,
            automatic_redirect_after_sign_out: true,
        }
    }
}

fn default_session_lifetime() -> u64 {
    10 * 3600
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
            users: seed::users(),
            signing: SigningConfig::default(),
            session: SessionConfig::default(),
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
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            let config = Config::default();

            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
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
    fn test_load_writes_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();

        let config = Config::load(path).unwrap();
        assert_eq!(config.users.len(), 2);
        assert!(dir.path().join("config.json").exists());

        // Second load reads the file back
        let again = Config::load(path).unwrap();
        assert_eq!(again.users[0].username, "Frank");
    }

    #[test]
    fn test_partial_config_uses_field_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "signing": { "key_path": "/keys/idp.pem" } }"#,
        )
        .unwrap();

        let config = Config::load(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.signing.key_path.as_deref(), Some("/keys/idp.pem"));
        assert_eq!(config.session.session_lifetime_secs, 36000);
        assert_eq!(config.users.len(), 2);
    }
}
