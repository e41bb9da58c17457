// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named secret storage on top of the cipher dispatcher.
//!
//! The vault owns no durability: records go through the [`RecordStore`]
//! boundary as JSON-serializable values, and the external settings layer
//! persists them. Records are keyed by logical key with last-write-wins
//! semantics; there is no cross-key locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use labfold_core::LabfoldError;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::BackendKind;
use crate::cipher::CredentialCipher;

/// One stored secret. Serialized shape: `{encrypted, method, timestamp, metadata}`.
///
/// Invariant: `encrypted` is empty exactly when `method` is
/// [`BackendKind::Empty`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Backend-specific ciphertext, already text-encoded.
    pub encrypted: String,
    /// Tag of the backend that produced the ciphertext.
    pub method: BackendKind,
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied context, never interpreted by the vault.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Persistence boundary owned by the external settings layer.
///
/// Implementations must be safe to call from concurrent tasks; the vault
/// makes no ordering guarantee beyond last-write-wins per key.
pub trait RecordStore: Send + Sync {
    fn load(&self, logical_key: &str) -> Result<Option<SecretRecord>, LabfoldError>;
    fn save(&self, logical_key: &str, record: SecretRecord) -> Result<(), LabfoldError>;
    fn delete(&self, logical_key: &str) -> Result<(), LabfoldError>;
}

/// In-memory record store for tests and embedding callers that handle
/// persistence themselves.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, SecretRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, logical_key: &str) -> Result<Option<SecretRecord>, LabfoldError> {
        let records = self
            .records
            .read()
            .map_err(|_| LabfoldError::Internal("record store lock poisoned".to_string()))?;
        Ok(records.get(logical_key).cloned())
    }

    fn save(&self, logical_key: &str, record: SecretRecord) -> Result<(), LabfoldError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LabfoldError::Internal("record store lock poisoned".to_string()))?;
        records.insert(logical_key.to_string(), record);
        Ok(())
    }

    fn delete(&self, logical_key: &str) -> Result<(), LabfoldError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LabfoldError::Internal("record store lock poisoned".to_string()))?;
        records.remove(logical_key);
        Ok(())
    }
}

/// The credential vault: encrypts on store, decrypts on retrieve.
pub struct CredentialVault {
    cipher: CredentialCipher,
    store: Arc<dyn RecordStore>,
}

impl CredentialVault {
    pub fn new(cipher: CredentialCipher, store: Arc<dyn RecordStore>) -> Self {
        Self { cipher, store }
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    /// Encrypt a value and replace any existing record for the key.
    pub async fn store(
        &self,
        logical_key: &str,
        plaintext: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), LabfoldError> {
        let out = self.cipher.encrypt(plaintext).await?;
        let record = SecretRecord {
            encrypted: out.ciphertext,
            method: out.backend,
            timestamp: Utc::now(),
            metadata,
        };
        self.store.save(logical_key, record)?;
        debug!(key = %logical_key, backend = %out.backend, "secret stored");
        Ok(())
    }

    /// Decrypt the record for a key.
    ///
    /// A missing record yields an empty string rather than an error, so
    /// optional-credential call sites stay simple. Decryption failures
    /// (including an unavailable tagged backend) propagate.
    pub async fn retrieve(&self, logical_key: &str) -> Result<SecretString, LabfoldError> {
        let Some(record) = self.store.load(logical_key)? else {
            return Ok(SecretString::from(String::new()));
        };
        let plaintext = self.cipher.decrypt(&record.encrypted, record.method).await?;
        Ok(SecretString::from(plaintext))
    }

    /// Remove the record for a key, if any.
    pub async fn delete(&self, logical_key: &str) -> Result<(), LabfoldError> {
        self.store.delete(logical_key)?;
        debug!(key = %logical_key, "secret deleted");
        Ok(())
    }

    /// Best-effort recovery of a raw value written before records carried a
    /// method tag. Values that decrypt with no backend are returned as-is.
    pub async fn recover_untagged(&self, raw_value: &str) -> SecretString {
        let (plaintext, backend) = self.cipher.auto_detect(raw_value).await;
        if backend.is_none() && !raw_value.is_empty() {
            warn!("untagged value recovered as plaintext (low confidence)");
        }
        SecretString::from(plaintext)
    }
}

/// Mask a secret value for display: `"sk-a...mnop"` format.
///
/// Shows up to 4 leading and trailing characters; values shorter than 10
/// characters are fully masked.
pub fn mask_secret(value: &str) -> String {
    // Counted in characters, not bytes: slicing a multibyte value at a
    // fixed byte offset would panic off a char boundary.
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::test_support::FakeKeystore;
    use crate::cipher::CapabilitySet;
    use crate::symmetric::SymmetricKey;
    use secrecy::ExposeSecret;
    use tempfile::tempdir;

    fn symmetric_vault(key: SymmetricKey) -> (CredentialVault, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let vault = CredentialVault::new(CredentialCipher::new(None, Some(key)), store.clone());
        (vault, store)
    }

    #[tokio::test]
    async fn store_and_retrieve() {
        let (vault, _) = symmetric_vault(SymmetricKey::generate().unwrap());
        vault
            .store("svc.password", "s3cret", BTreeMap::new())
            .await
            .unwrap();
        let value = vault.retrieve("svc.password").await.unwrap();
        assert_eq!(value.expose_secret(), "s3cret");
    }

    #[tokio::test]
    async fn retrieve_missing_key_returns_empty() {
        let (vault, _) = symmetric_vault(SymmetricKey::generate().unwrap());
        let value = vault.retrieve("never.stored").await.unwrap();
        assert_eq!(value.expose_secret(), "");
    }

    #[tokio::test]
    async fn store_overwrites_existing_record() {
        let (vault, _) = symmetric_vault(SymmetricKey::generate().unwrap());
        vault.store("key", "first", BTreeMap::new()).await.unwrap();
        vault.store("key", "second", BTreeMap::new()).await.unwrap();
        assert_eq!(vault.retrieve("key").await.unwrap().expose_secret(), "second");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let (vault, _) = symmetric_vault(SymmetricKey::generate().unwrap());
        vault.store("gone", "value", BTreeMap::new()).await.unwrap();
        vault.delete("gone").await.unwrap();
        assert_eq!(vault.retrieve("gone").await.unwrap().expose_secret(), "");
    }

    #[tokio::test]
    async fn empty_value_stores_empty_record() {
        let (vault, store) = symmetric_vault(SymmetricKey::generate().unwrap());
        vault.store("blank", "", BTreeMap::new()).await.unwrap();

        let record = store.load("blank").unwrap().unwrap();
        assert_eq!(record.encrypted, "");
        assert_eq!(record.method, BackendKind::Empty);
        assert_eq!(vault.retrieve("blank").await.unwrap().expose_secret(), "");
    }

    #[tokio::test]
    async fn record_serializes_to_external_shape() {
        let (vault, store) = symmetric_vault(SymmetricKey::generate().unwrap());
        let mut metadata = BTreeMap::new();
        metadata.insert("origin".to_string(), "settings".to_string());
        vault.store("svc.token", "abc123xyz9", metadata).await.unwrap();

        let record = store.load("svc.token").unwrap().unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("encrypted").is_some());
        assert_eq!(json["method"], "symmetric_key");
        assert!(json.get("timestamp").is_some());
        assert_eq!(json["metadata"]["origin"], "settings");

        // And back.
        let roundtrip: SecretRecord = serde_json::from_value(json).unwrap();
        assert_eq!(roundtrip.method, BackendKind::SymmetricKey);
    }

    /// Restart asymmetry: with the symmetric backend the persisted key is
    /// reloaded and the secret survives a process restart. With the
    /// platform keystore, out-of-band revocation legitimately makes the
    /// record unreadable -- that is accepted behavior, surfaced as
    /// `BackendUnavailable` rather than silently retried elsewhere.
    #[tokio::test]
    async fn restart_recovers_symmetric_but_not_revoked_keystore() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("vault.key");
        let store = Arc::new(MemoryStore::new());

        // First process: store on both backends.
        {
            let key = SymmetricKey::load_or_generate(&key_path).unwrap();
            let vault = CredentialVault::new(CredentialCipher::new(None, Some(key)), store.clone());
            vault
                .store("svc.password", "s3cret", BTreeMap::new())
                .await
                .unwrap();
        }
        let keystore_vault = CredentialVault::new(
            CredentialCipher::new(Some(FakeKeystore::available()), None),
            store.clone(),
        );
        keystore_vault
            .store("svc.keystore_password", "s3cret", BTreeMap::new())
            .await
            .unwrap();

        // Restart: key file reloaded, keystore access revoked.
        let key = SymmetricKey::load_or_generate(&key_path).unwrap();
        let vault = CredentialVault::new(
            CredentialCipher::with_capabilities(
                None,
                Some(key),
                CapabilitySet {
                    platform_keystore: false,
                    symmetric_key: true,
                    obfuscation: true,
                },
            ),
            store,
        );

        let recovered = vault.retrieve("svc.password").await.unwrap();
        assert_eq!(recovered.expose_secret(), "s3cret");

        let revoked = vault.retrieve("svc.keystore_password").await;
        assert!(revoked.is_err(), "revoked keystore must fail, not fall back");
    }

    #[tokio::test]
    async fn recover_untagged_handles_plaintext_legacy_value() {
        let (vault, _) = symmetric_vault(SymmetricKey::generate().unwrap());
        let value = vault.recover_untagged("legacy plain password").await;
        assert_eq!(value.expose_secret(), "legacy plain password");
    }

    #[test]
    fn mask_secret_long_value() {
        assert_eq!(mask_secret("sk-api03-abcdefghijklmnop"), "sk-a...mnop");
    }

    #[test]
    fn mask_secret_short_value() {
        assert_eq!(mask_secret("short"), "****");
    }

    #[test]
    fn mask_secret_exact_boundary() {
        assert_eq!(mask_secret("1234567890"), "1234...7890");
    }

    #[test]
    fn mask_secret_multibyte_value() {
        // Byte offsets 4 and len-4 fall inside multibyte chars here; the
        // mask must count characters instead of panicking.
        assert_eq!(mask_secret("aααααααααα"), "aααα...αααα");
        assert_eq!(mask_secret("ααα"), "****");
    }
}
