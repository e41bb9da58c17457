// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM backend with a locally persisted random key.
//!
//! Every call to [`SymmetricKey::encrypt`] generates a fresh random 96-bit
//! nonce via the system CSPRNG and prefixes it to the ciphertext before
//! base64 encoding, so decryption needs only the encoded blob and the key.
//! Nonce reuse would be catastrophic for GCM security.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::backend::{BackendKind, CipherError};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Process-durable key material for the symmetric backend.
///
/// Exactly one instance per installation: generated once, exported as an
/// opaque base64 string, re-imported on subsequent runs. Never exposed to
/// callers; zeroed on drop.
pub struct SymmetricKey {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SymmetricKey {
    /// Generate a fresh random 256-bit key.
    pub fn generate() -> Result<Self, CipherError> {
        let rng = SystemRandom::new();
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(key.as_mut())
            .map_err(|_| CipherError::KeyMaterial("failed to generate random key".to_string()))?;
        Ok(Self { key })
    }

    /// Export the key as an opaque base64 string for persistence.
    pub fn export(&self) -> String {
        BASE64.encode(self.key.as_ref())
    }

    /// Re-import a key previously produced by [`export`](Self::export).
    pub fn import(exported: &str) -> Result<Self, CipherError> {
        let bytes = BASE64
            .decode(exported.trim())
            .map_err(|e| CipherError::KeyMaterial(format!("corrupted key material: {e}")))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CipherError::KeyMaterial("corrupted key material: expected 32 bytes".to_string()))?;
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    /// Load the key from a file, generating and persisting a new one if the
    /// file does not exist yet.
    pub fn load_or_generate(path: &Path) -> Result<Self, CipherError> {
        if path.exists() {
            let exported = std::fs::read_to_string(path)
                .map_err(|e| CipherError::KeyMaterial(format!("failed to read key file: {e}")))?;
            let key = Self::import(&exported)?;
            debug!(path = %path.display(), "loaded existing symmetric key");
            return Ok(key);
        }

        let key = Self::generate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CipherError::KeyMaterial(format!("failed to create key dir: {e}")))?;
        }
        std::fs::write(path, key.export())
            .map_err(|e| CipherError::KeyMaterial(format!("failed to write key file: {e}")))?;
        info!(path = %path.display(), "generated new symmetric key");
        Ok(key)
    }

    /// Encrypt plaintext to `base64(nonce || ciphertext || tag)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let unbound = UnboundKey::new(&AES_256_GCM, self.key.as_ref()).map_err(|_| {
            CipherError::EncryptionFailed {
                backend: BackendKind::SymmetricKey,
                message: "failed to create AES-256-GCM key".to_string(),
            }
        })?;
        let less_safe = LessSafeKey::new(unbound);

        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| CipherError::EncryptionFailed {
                backend: BackendKind::SymmetricKey,
                message: "failed to generate random nonce".to_string(),
            })?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        // Seal in place: the buffer is extended with the authentication tag.
        let mut in_out = plaintext.as_bytes().to_vec();
        less_safe
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CipherError::EncryptionFailed {
                backend: BackendKind::SymmetricKey,
                message: "AES-256-GCM encryption failed".to_string(),
            })?;

        let mut combined = Vec::with_capacity(NONCE_LEN + in_out.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&in_out);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let failed = |message: String| CipherError::DecryptionFailed {
            backend: BackendKind::SymmetricKey,
            message,
        };

        let combined = BASE64
            .decode(encoded)
            .map_err(|e| failed(format!("invalid base64: {e}")))?;
        if combined.len() < NONCE_LEN {
            return Err(failed("blob shorter than nonce".to_string()));
        }

        let nonce_bytes: [u8; NONCE_LEN] = combined[..NONCE_LEN].try_into().expect("length checked");
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let unbound = UnboundKey::new(&AES_256_GCM, self.key.as_ref())
            .map_err(|_| failed("failed to create AES-256-GCM key".to_string()))?;
        let less_safe = LessSafeKey::new(unbound);

        let mut in_out = combined[NONCE_LEN..].to_vec();
        let plaintext = less_safe
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| failed("wrong key or corrupted data".to_string()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| failed(format!("decrypted value is not valid UTF-8: {e}")))
    }
}
