//! Token signing credential
//!
//! Identity and access tokens are signed with RS256. The key either comes
//! from a configured PKCS#8 PEM file or, for development, is generated once
//! and kept in the config directory so restarts keep issuing tokens that
//! clients can still verify.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

const DEVELOPER_KEY_FILE: &str = "tempkey.pem";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no signing key found at {0:?}")]
    NotFound(PathBuf),

    #[error("failed to read signing key {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid signing key: {0}")]
    Invalid(String),

    #[error("failed to generate signing key: {0}")]
    Generate(#[from] rsa::Error),
}

pub struct SigningCredential {
    key_id: String,
    modulus: String,
    exponent: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningCredential {
    /// Load the key configured for production use
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KeyError::NotFound(path.to_path_buf()));
        }
        let pem = std::fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Load the developer key from `config_path`, generating it on first use
    pub fn developer(config_path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = config_path.as_ref().join(DEVELOPER_KEY_FILE);
        if path.exists() {
            return Self::from_pem_file(&path);
        }

        tracing::warn!("Generating developer signing key at {:?}", path);
        let key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048)?;
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Invalid(e.to_string()))?;
        std::fs::write(&path, pem.as_bytes()).map_err(|source| KeyError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_private_key(&key, pem.as_str())
    }

    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| KeyError::Invalid(e.to_string()))?;
        Self::from_private_key(&key, pem)
    }

    fn from_private_key(key: &RsaPrivateKey, pem: &str) -> Result<Self, KeyError> {
        let modulus = URL_SAFE_NO_PAD.encode(key.n().to_bytes_be());
        let exponent = URL_SAFE_NO_PAD.encode(key.e().to_bytes_be());

        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeyError::Invalid(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_components(&modulus, &exponent)
            .map_err(|e| KeyError::Invalid(e.to_string()))?;

        Ok(Self {
            key_id: jwk_thumbprint(&modulus, &exponent),
            modulus,
            exponent,
            encoding_key,
            decoding_key,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public key set served at the JWKS endpoint
    pub fn jwks(&self) -> serde_json::Value {
        json!({
            "keys": [{
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": self.key_id,
                "n": self.modulus,
                "e": self.exponent,
            }]
        })
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.clone());
        header.typ = Some("JWT".to_string());
        encode(&header, claims, &self.encoding_key)
    }

    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<TokenData<T>, jsonwebtoken::errors::Error> {
        decode(token, &self.decoding_key, validation)
    }
}

/// RFC 7638 thumbprint of an RSA public key
fn jwk_thumbprint(modulus: &str, exponent: &str) -> String {
    // Members in lexicographic order, no whitespace
    let canonical = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, exponent, modulus);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FIXTURE: &str = include_str!("../tests/fixtures/signing_key.pem");

    #[test]
    fn test_missing_key_file_is_reported() {
        let err = SigningCredential::from_pem_file("/nonexistent/idp.pem")
            .err()
            .expect("should fail");
        assert!(matches!(err, KeyError::NotFound(_)));
        assert!(err.to_string().contains("no signing key found"));
    }

    #[test]
    fn test_sign_and_verify() {
        let credential = SigningCredential::from_pem(FIXTURE).unwrap();
        let token = credential
            .sign(&json!({ "sub": "818727", "exp": chrono::Utc::now().timestamp() + 60 }))
            .unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(credential.key_id()));

        let data: TokenData<serde_json::Value> = credential
            .verify(&token, &Validation::new(Algorithm::RS256))
            .unwrap();
        assert_eq!(data.claims["sub"], "818727");
    }

    #[test]
    fn test_jwks_publishes_key_id() {
        let credential = SigningCredential::from_pem(FIXTURE).unwrap();
        let jwks = credential.jwks();
        assert_eq!(jwks["keys"][0]["kid"], credential.key_id());
        assert_eq!(jwks["keys"][0]["alg"], "RS256");
    }

    #[test]
    fn test_developer_key_is_reused() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEVELOPER_KEY_FILE), FIXTURE).unwrap();

        let first = SigningCredential::developer(dir.path()).unwrap();
        let second = SigningCredential::developer(dir.path()).unwrap();
        assert_eq!(first.key_id(), second.key_id());
    }
}
