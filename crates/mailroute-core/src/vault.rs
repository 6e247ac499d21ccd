//! Credential vault - encryption at rest for account secrets
//!
//! Account provider configs and OAuth blobs are stored as
//! `ivHex:tagHex:cipherHex` strings, AES-256-GCM with a random 16-byte
//! IV per call. The key is derived by hashing the configured secret;
//! the raw secret is never persisted.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::OsRng;
use aes_gcm::aes::Aes256;
use aes_gcm::{AeadCore, AeadInPlace, AesGcm, KeyInit, Nonce, Tag};
use mailroute_common::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// AES-256-GCM with a 16-byte nonce, matching the stored blob format
type Cipher = AesGcm<Aes256, U16>;

/// Symmetric vault for account credentials
#[derive(Clone)]
pub struct CredentialVault {
    secret: Option<String>,
}

impl CredentialVault {
    /// Create a vault from the configured secret.
    ///
    /// The secret may be absent; every vault operation then fails with a
    /// configuration error, while code paths that never touch stored
    /// credentials keep working.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    fn cipher(&self) -> Result<Cipher> {
        let secret = self.secret.as_deref().ok_or_else(|| {
            Error::Config("credential encryption secret is not configured".to_string())
        })?;

        let key = Sha256::digest(secret.as_bytes());
        Cipher::new_from_slice(&key)
            .map_err(|e| Error::Config(format!("failed to derive vault key: {}", e)))
    }

    /// Encrypt a credential object into the storable blob format
    pub fn encrypt(&self, plain: &serde_json::Value) -> Result<String> {
        let cipher = self.cipher()?;
        let iv = Cipher::generate_nonce(&mut OsRng);

        let mut buffer = serde_json::to_vec(plain)
            .map_err(|e| Error::Internal(format!("failed to serialize credential: {}", e)))?;

        let tag = cipher
            .encrypt_in_place_detached(&iv, b"", &mut buffer)
            .map_err(|e| Error::Internal(format!("encryption failed: {}", e)))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Decrypt a stored blob.
    ///
    /// Returns `Ok(None)` for anything that does not decrypt cleanly -
    /// corrupt data, a foreign format, a failed auth tag. Callers treat
    /// that as "no usable credential"; only the missing-secret
    /// configuration error propagates.
    pub fn decrypt(&self, blob: &str) -> Result<Option<serde_json::Value>> {
        let cipher = self.cipher()?;

        let Some((iv, tag, mut buffer)) = parse_blob(blob) else {
            debug!("credential blob is not in iv:tag:cipher format");
            return Ok(None);
        };

        if cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .is_err()
        {
            debug!("credential blob failed authentication");
            return Ok(None);
        }

        match serde_json::from_slice(&buffer) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                debug!("decrypted credential is not valid JSON");
                Ok(None)
            }
        }
    }

    /// Decrypt a credential field as written by any format version.
    ///
    /// Older versions stored the bare blob string; newer ones wrap it in
    /// an `{"encrypted": "..."}` container.
    pub fn decrypt_field(&self, field: &serde_json::Value) -> Result<Option<serde_json::Value>> {
        match field {
            serde_json::Value::String(blob) => self.decrypt(blob),
            serde_json::Value::Object(map) => match map.get("encrypted") {
                Some(serde_json::Value::String(blob)) => self.decrypt(blob),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

/// Split an `ivHex:tagHex:cipherHex` blob; IV must be 16 bytes, tag 16 bytes.
fn parse_blob(blob: &str) -> Option<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let mut parts = blob.splitn(3, ':');
    let iv = hex::decode(parts.next()?).ok()?;
    let tag = hex::decode(parts.next()?).ok()?;
    let cipher = hex::decode(parts.next()?).ok()?;

    if iv.len() != 16 || tag.len() != 16 {
        return None;
    }

    Some((iv, tag, cipher))
}
