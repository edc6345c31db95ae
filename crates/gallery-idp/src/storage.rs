//! Persistent configuration store for clients and resources

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{bail, Context, Result};
use gallery_model::claims::scopes;
use serde::{Deserialize, Serialize};

use crate::model::{ApiResource, Client, IdentityResource, GRANT_AUTHORIZATION_CODE};
use crate::seed;

/// Storage for configuration records
pub struct ConfigurationStore {
    config_path: PathBuf,
    /// Registered clients
    clients: RwLock<ClientStore>,
    /// Identity and API resources
    resources: RwLock<ResourceStore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ClientStore {
    clients: HashMap<String, Client>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ResourceStore {
    identity_resources: Vec<IdentityResource>,
    api_resources: Vec<ApiResource>,
}

/// Resources backing a set of requested scopes
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub identity: Vec<IdentityResource>,
    pub apis: Vec<ApiResource>,
    pub offline_access: bool,
}

impl Resources {
    pub fn has_identity(&self, name: &str) -> bool {
        self.identity.iter().any(|r| r.name == name)
    }

    /// Claim types the requested APIs want in access tokens
    pub fn api_claim_types(&self) -> Vec<&str> {
        self.apis
            .iter()
            .flat_map(|r| r.user_claims.iter().map(String::as_str))
            .collect()
    }
}

impl ConfigurationStore {
    /// Create a store backed by JSON files in `config_path`
    pub fn new(config_path: &str) -> Result<Self> {
        let config_path = PathBuf::from(config_path);
        std::fs::create_dir_all(&config_path)
            .with_context(|| format!("Failed to create config directory: {:?}", config_path))?;

        let store = Self {
            config_path,
            clients: RwLock::new(ClientStore::default()),
            resources: RwLock::new(ResourceStore::default()),
        };

        store.load_clients()?;
        store.load_resources()?;

        Ok(store)
    }

    /// Seed every empty collection with the built-in configuration.
    ///
    /// Collections that already hold records are left untouched, so running
    /// this on every start is safe.
    pub fn initialize(&self) -> Result<()> {
        let mut clients_seeded = false;
        {
            let mut store = self.clients.write().unwrap();
            if store.clients.is_empty() {
                for client in seed::clients() {
                    store.clients.insert(client.client_id.clone(), client);
                }
                clients_seeded = true;
            }
        }
        if clients_seeded {
            self.save_clients()?;
            tracing::info!("Seeded client configuration");
        }

        let mut resources_seeded = false;
        {
            let mut store = self.resources.write().unwrap();
            if store.identity_resources.is_empty() {
                store.identity_resources = seed::identity_resources();
                resources_seeded = true;
            }
            if store.api_resources.is_empty() {
                store.api_resources = seed::api_resources();
                resources_seeded = true;
            }
        }
        if resources_seeded {
            self.save_resources()?;
            tracing::info!("Seeded resource configuration");
        }

        self.validate()
    }

    /// Check the fields OIDC needs are populated
    pub fn validate(&self) -> Result<()> {
        let resources = self.resources.read().unwrap();
        if !resources
            .identity_resources
            .iter()
            .any(|r| r.name == scopes::OPENID)
        {
            bail!("the openid identity resource is not configured");
        }

        let clients = self.clients.read().unwrap();
        for client in clients.clients.values() {
            if client.client_id.is_empty() {
                bail!("a client has an empty client_id");
            }
            if client.allows_grant(GRANT_AUTHORIZATION_CODE) && client.redirect_uris.is_empty() {
                bail!("client {} has no redirect_uris", client.client_id);
            }
        }
        Ok(())
    }

    // --- Lookups ---

    pub fn find_client(&self, client_id: &str) -> Option<Client> {
        let store = self.clients.read().unwrap();
        store.clients.get(client_id).cloned()
    }

    pub fn find_api_resource(&self, name: &str) -> Option<ApiResource> {
        let store = self.resources.read().unwrap();
        store.api_resources.iter().find(|r| r.name == name).cloned()
    }

    pub fn identity_resources(&self) -> Vec<IdentityResource> {
        self.resources.read().unwrap().identity_resources.clone()
    }

    /// Every scope name the provider knows about
    pub fn supported_scopes(&self) -> Vec<String> {
        let store = self.resources.read().unwrap();
        store
            .identity_resources
            .iter()
            .map(|r| r.name.clone())
            .chain(store.api_resources.iter().map(|r| r.name.clone()))
            .chain(std::iter::once(scopes::OFFLINE_ACCESS.to_string()))
            .collect()
    }

    /// Map requested scopes to resources. Returns the first unknown scope as error.
    pub fn resolve_scopes<'a>(
        &self,
        requested: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<Resources, String> {
        let store = self.resources.read().unwrap();
        let mut resources = Resources::default();

        for scope in requested {
            if scope == scopes::OFFLINE_ACCESS {
                resources.offline_access = true;
            } else if let Some(r) = store.identity_resources.iter().find(|r| r.name == scope) {
                resources.identity.push(r.clone());
            } else if let Some(r) = store.api_resources.iter().find(|r| r.name == scope) {
                resources.apis.push(r.clone());
            } else {
                return Err(scope.to_string());
            }
        }
        Ok(resources)
    }

    // --- Persistence ---

    fn clients_path(&self) -> PathBuf {
        self.config_path.join("clients.json")
    }

    fn resources_path(&self) -> PathBuf {
        self.config_path.join("resources.json")
    }

    fn load_clients(&self) -> Result<()> {
        let path = self.clients_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let store: ClientStore = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", path))?;
            tracing::info!("Loaded {} clients", store.clients.len());
            *self.clients.write().unwrap() = store;
        }
        Ok(())
    }

    fn save_clients(&self) -> Result<()> {
        let store = self.clients.read().unwrap();
        let content = serde_json::to_string_pretty(&*store)?;
        std::fs::write(self.clients_path(), content)?;
        Ok(())
    }

    fn load_resources(&self) -> Result<()> {
        let path = self.resources_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let store: ResourceStore = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", path))?;
            tracing::info!(
                "Loaded {} identity resources and {} api resources",
                store.identity_resources.len(),
                store.api_resources.len()
            );
            *self.resources.write().unwrap() = store;
        }
        Ok(())
    }

    fn save_resources(&self) -> Result<()> {
        let store = self.resources.read().unwrap();
        let content = serde_json::to_string_pretty(&*store)?;
        std::fs::write(self.resources_path(), content)?;
        Ok(())
    }
}

// --- Utility Functions ---

/// Generate a cryptographically secure random string
pub fn generate_random_string(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Hash a token, code or secret for storage (we don't store raw values)
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigurationStore {
        ConfigurationStore::new(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_initialize_seeds_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.find_client("imagegalleryclient").is_none());

        store.initialize().unwrap();
        assert!(store.find_client("imagegalleryclient").is_some());
        assert!(store.find_api_resource("imagegalleryapi").is_some());
        assert!(dir.path().join("clients.json").exists());
        assert!(dir.path().join("resources.json").exists());
    }

    #[test]
    fn test_initialize_keeps_existing_clients() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir);
            store.initialize().unwrap();
        }

        // Edit the persisted client and make sure a restart keeps the edit
        let path = dir.path().join("clients.json");
        let edited = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"Image Gallery\"", "\"Renamed Gallery\"");
        std::fs::write(&path, edited).unwrap();

        let store = store_in(&dir);
        store.initialize().unwrap();
        let client = store.find_client("imagegalleryclient").unwrap();
        assert_eq!(client.client_name, "Renamed Gallery");
    }

    #[test]
    fn test_resolve_scopes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.initialize().unwrap();

        let resources = store
            .resolve_scopes(["openid", "roles", "imagegalleryapi", "offline_access"])
            .unwrap();
        assert!(resources.has_identity("openid"));
        assert!(resources.has_identity("roles"));
        assert_eq!(resources.apis.len(), 1);
        assert!(resources.offline_access);
        assert_eq!(resources.api_claim_types(), vec!["role"]);

        assert_eq!(
            store.resolve_scopes(["openid", "bogus"]).unwrap_err(),
            "bogus"
        );
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert_eq!(generate_random_string(32).len(), 32);
    }
}
