//! Deployment keypair stored as plaintext JSON.
//!
//! Test and demo networks only: the private key is written to disk as-is.

use std::fs;
use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::info;

use crate::errors::{DeployError, Result};

/// Authentication-key scheme byte for single ed25519 keys.
const ED25519_SCHEME: u8 = 0x00;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    pub address: String,
    pub public_key: String,
    pub private_key: String,
}

pub struct DeploymentKey {
    signing: SigningKey,
}

impl DeploymentKey {
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self {
            signing: SigningKey::from_bytes(&secret),
        }
    }

    /// Accepts `0x`-prefixed, bare, or AIP-80 (`ed25519-priv-0x…`) hex.
    pub fn from_private_hex(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let stripped = trimmed.strip_prefix("ed25519-priv-").unwrap_or(trimmed);
        let stripped = stripped.strip_prefix("0x").unwrap_or(stripped);
        let bytes = hex::decode(stripped).map_err(|e| DeployError::InvalidKey(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| DeployError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&secret),
        })
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Account address: `sha3_256(public_key || 0x00)`.
    pub fn address(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.public_key_bytes());
        hasher.update([ED25519_SCHEME]);
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing.to_bytes()))
    }

    pub fn to_key_file(&self) -> KeyFile {
        KeyFile {
            address: self.address(),
            public_key: format!("0x{}", hex::encode(self.public_key_bytes())),
            private_key: self.private_key_hex(),
        }
    }
}

pub fn save(path: &Path, key: &DeploymentKey) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&key.to_key_file())?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a key file, checking that the stored address matches the key.
pub fn load(path: &Path) -> Result<DeploymentKey> {
    let file: KeyFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    let key = DeploymentKey::from_private_hex(&file.private_key)?;
    let derived = key.address();
    if !file.address.eq_ignore_ascii_case(&derived) {
        return Err(DeployError::KeyMismatch {
            path: path.to_path_buf(),
            stored: file.address,
            derived,
        });
    }
    Ok(key)
}

/// Returns the key and whether it was freshly generated.
pub fn load_or_generate(path: &Path) -> Result<(DeploymentKey, bool)> {
    if path.exists() {
        let key = load(path)?;
        info!("Loaded deployment key for {} from {}", key.address(), path.display());
        return Ok((key, false));
    }
    let key = DeploymentKey::generate();
    save(path, &key)?;
    info!(
        "Generated new deployment key for {} and saved it to {}",
        key.address(),
        path.display()
    );
    Ok((key, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8032 test vector 1
    const SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const PUBLIC: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
    const ADDRESS: &str = "0x63c5215e87770d17b9f4cd47c777e322f4eb152cfd2054c1080fd9d57c48913b";

    #[test]
    fn derives_address_from_known_key() {
        let key = DeploymentKey::from_private_hex(SECRET).unwrap();
        assert_eq!(hex::encode(key.public_key_bytes()), PUBLIC);
        assert_eq!(key.address(), ADDRESS);
    }

    #[test]
    fn accepts_prefixed_private_keys() {
        for raw in [
            format!("0x{SECRET}"),
            format!("ed25519-priv-0x{SECRET}"),
            format!("  {SECRET}\n"),
        ] {
            assert_eq!(DeploymentKey::from_private_hex(&raw).unwrap().address(), ADDRESS);
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            DeploymentKey::from_private_hex("0x1234"),
            Err(DeployError::InvalidKey(_))
        ));
        assert!(matches!(
            DeploymentKey::from_private_hex("not hex"),
            Err(DeployError::InvalidKey(_))
        ));
    }

    #[test]
    fn generated_keys_are_distinct() {
        let a = DeploymentKey::generate();
        let b = DeploymentKey::generate();
        assert_ne!(a.address(), b.address());
        assert_eq!(a.address().len(), 66);
    }

    #[test]
    fn key_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("deployment-key.json");

        let (first, created) = load_or_generate(&path).unwrap();
        assert!(created);
        assert!(path.exists());

        let (second, created) = load_or_generate(&path).unwrap();
        assert!(!created);
        assert_eq!(first.address(), second.address());

        let stored: KeyFile =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored.private_key, first.private_key_hex());
        assert!(stored.public_key.starts_with("0x"));
    }

    #[test]
    fn tampered_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment-key.json");
        let key = DeploymentKey::from_private_hex(SECRET).unwrap();
        let mut file = key.to_key_file();
        file.address = "0x1".into();
        fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        assert!(matches!(load(&path), Err(DeployError::KeyMismatch { .. })));
    }
}
