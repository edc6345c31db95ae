//! Configuration loading and management

use std::path::Path;

use anyhow::{Context, Result};
use gallery_model::{claims, endpoints};
use serde::{Deserialize, Serialize};

/// Main configuration for the gallery API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the identity provider
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Our API resource name; required audience of every access token
    #[serde(default = "default_api_name")]
    pub api_name: String,

    /// Secret used to authenticate at the introspection endpoint
    #[serde(default = "default_api_secret")]
    pub api_secret: String,

    /// How long fetched signing keys are trusted before refetching, in seconds
    #[serde(default = "default_jwks_refresh")]
    pub jwks_refresh_secs: u64,
}

fn default_authority() -> String {
    endpoints::IDP_URL.to_string()
}

fn default_api_name() -> String {
    claims::GALLERY_API.to_string()
}

fn default_api_secret() -> String {
    "apisecret".to_string()
}

fn default_jwks_refresh() -> u64 {
    24 * 3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            api_name: default_api_name(),
            api_secret: default_api_secret(),
            jwks_refresh_secs: default_jwks_refresh(),
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
