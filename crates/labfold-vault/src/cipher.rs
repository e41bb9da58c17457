// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend selection and dispatch.
//!
//! Encryption picks the strongest available backend and degrades gracefully
//! down the priority chain if it fails. Decryption is strict: the record's
//! tag decides the backend, and an unavailable backend is an error rather
//! than an invitation to guess with the wrong key.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{BackendKind, CipherError, CipherOutput};
use crate::obfuscate;
use crate::platform::{self, PlatformKeystore};
use crate::symmetric::SymmetricKey;

/// Which backends can run in this process, discovered once at construction.
///
/// Invariant: `obfuscation` is always true, so at least one flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    pub platform_keystore: bool,
    pub symmetric_key: bool,
    pub obfuscation: bool,
}

impl CapabilitySet {
    fn detect(keystore: Option<&Arc<dyn PlatformKeystore>>, key: Option<&SymmetricKey>) -> Self {
        Self {
            platform_keystore: keystore.map(|k| k.is_available()).unwrap_or(false),
            symmetric_key: key.is_some(),
            obfuscation: true,
        }
    }

    fn allows(&self, backend: BackendKind) -> bool {
        match backend {
            BackendKind::PlatformKeystore => self.platform_keystore,
            BackendKind::SymmetricKey => self.symmetric_key,
            BackendKind::Obfuscation => self.obfuscation,
            BackendKind::Empty => true,
        }
    }
}

/// Encrypt/decrypt dispatcher over the three cipher backends.
pub struct CredentialCipher {
    keystore: Option<Arc<dyn PlatformKeystore>>,
    key: Option<SymmetricKey>,
    capabilities: CapabilitySet,
}

/// Priority order for selection, encrypt-side fallback, and auto-detection.
const PRIORITY: [BackendKind; 3] = [
    BackendKind::PlatformKeystore,
    BackendKind::SymmetricKey,
    BackendKind::Obfuscation,
];

impl CredentialCipher {
    /// Build a cipher, probing capabilities from what was injected.
    pub fn new(keystore: Option<Arc<dyn PlatformKeystore>>, key: Option<SymmetricKey>) -> Self {
        let capabilities = CapabilitySet::detect(keystore.as_ref(), key.as_ref());
        debug!(
            platform_keystore = capabilities.platform_keystore,
            symmetric_key = capabilities.symmetric_key,
            "credential cipher initialized"
        );
        Self {
            keystore,
            key,
            capabilities,
        }
    }

    /// Build a cipher with an explicit capability set, for tests that need
    /// to simulate a capability disappearing after records were written.
    pub fn with_capabilities(
        keystore: Option<Arc<dyn PlatformKeystore>>,
        key: Option<SymmetricKey>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            keystore,
            key,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// The backend encryption will try first: the highest-priority
    /// available one.
    pub fn select_backend(&self) -> BackendKind {
        PRIORITY
            .into_iter()
            .find(|b| self.capabilities.allows(*b))
            .unwrap_or(BackendKind::Obfuscation)
    }

    /// Encrypt with the best available backend, degrading down the chain on
    /// failure. Cannot fail overall: obfuscation always succeeds.
    ///
    /// Empty plaintext short-circuits to an empty ciphertext tagged
    /// [`BackendKind::Empty`] without invoking any backend.
    pub async fn encrypt(&self, plaintext: &str) -> Result<CipherOutput, CipherError> {
        if plaintext.trim().is_empty() {
            return Ok(CipherOutput {
                ciphertext: String::new(),
                backend: BackendKind::Empty,
            });
        }

        let mut last_err = None;
        for backend in PRIORITY {
            if !self.capabilities.allows(backend) {
                continue;
            }
            match self.encrypt_with(backend, plaintext).await {
                Ok(ciphertext) => {
                    if last_err.is_some() {
                        warn!(%backend, "encryption degraded to fallback backend");
                    }
                    return Ok(CipherOutput {
                        ciphertext,
                        backend,
                    });
                }
                Err(e) => {
                    warn!(%backend, error = %e, "backend encryption failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        // Obfuscation is infallible, so this is unreachable in practice.
        Err(last_err.unwrap_or(CipherError::BackendUnavailable {
            backend: BackendKind::Obfuscation,
        }))
    }

    /// Decrypt strictly by the recorded tag.
    ///
    /// If the tagged backend is unavailable now (keystore revoked, key file
    /// gone), this fails with [`CipherError::BackendUnavailable`] -- it must
    /// not fall back, since interpreting foreign ciphertext with another key
    /// would produce garbage that looks like success.
    pub async fn decrypt(&self, ciphertext: &str, backend: BackendKind) -> Result<String, CipherError> {
        if ciphertext.is_empty() || backend == BackendKind::Empty {
            return Ok(String::new());
        }
        if !self.capabilities.allows(backend) {
            return Err(CipherError::BackendUnavailable { backend });
        }
        self.decrypt_with(backend, ciphertext).await
    }

    /// Best-effort decryption of a legacy value with no recorded tag.
    ///
    /// Tries each available backend in priority order and accepts the first
    /// clean decrypt. A value that fails all backends is treated as
    /// already-plaintext, logged as a low-confidence recovery. Tagged
    /// records never take this path.
    pub async fn auto_detect(&self, ciphertext: &str) -> (String, Option<BackendKind>) {
        if ciphertext.is_empty() {
            return (String::new(), Some(BackendKind::Empty));
        }

        for backend in PRIORITY {
            if !self.capabilities.allows(backend) {
                continue;
            }
            match self.decrypt_with(backend, ciphertext).await {
                Ok(plaintext) if !plaintext.is_empty() => {
                    debug!(%backend, "auto-detected cipher backend for untagged value");
                    return (plaintext, Some(backend));
                }
                Ok(_) => continue,
                Err(_) => continue,
            }
        }

        warn!("auto-detection failed for untagged value, treating as plaintext");
        (ciphertext.to_string(), None)
    }

    async fn encrypt_with(&self, backend: BackendKind, plaintext: &str) -> Result<String, CipherError> {
        match backend {
            BackendKind::PlatformKeystore => {
                let keystore = self.keystore.as_ref().ok_or_else(platform::unavailable)?;
                keystore.encrypt(plaintext).await
            }
            BackendKind::SymmetricKey => {
                let key = self.key.as_ref().ok_or(CipherError::BackendUnavailable {
                    backend: BackendKind::SymmetricKey,
                })?;
                key.encrypt(plaintext)
            }
            BackendKind::Obfuscation => Ok(obfuscate::obfuscate(plaintext)),
            BackendKind::Empty => Ok(String::new()),
        }
    }

    async fn decrypt_with(&self, backend: BackendKind, ciphertext: &str) -> Result<String, CipherError> {
        match backend {
            BackendKind::PlatformKeystore => {
                let keystore = self.keystore.as_ref().ok_or_else(platform::unavailable)?;
                keystore.decrypt(ciphertext).await
            }
            BackendKind::SymmetricKey => {
                let key = self.key.as_ref().ok_or(CipherError::BackendUnavailable {
                    backend: BackendKind::SymmetricKey,
                })?;
                key.decrypt(ciphertext)
            }
            BackendKind::Obfuscation => obfuscate::deobfuscate(ciphertext),
            BackendKind::Empty => Ok(String::new()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeKeystore;
    use super::*;

    fn symmetric_only() -> CredentialCipher {
        CredentialCipher::new(None, Some(SymmetricKey::generate().unwrap()))
    }

    #[tokio::test]
    async fn selects_platform_keystore_when_available() {
        let cipher = CredentialCipher::new(
            Some(FakeKeystore::available()),
            Some(SymmetricKey::generate().unwrap()),
        );
        assert_eq!(cipher.select_backend(), BackendKind::PlatformKeystore);
    }

    #[tokio::test]
    async fn selects_symmetric_without_keystore() {
        assert_eq!(symmetric_only().select_backend(), BackendKind::SymmetricKey);
    }

    #[tokio::test]
    async fn selects_obfuscation_as_last_resort() {
        let cipher = CredentialCipher::new(None, None);
        assert_eq!(cipher.select_backend(), BackendKind::Obfuscation);
    }

    #[tokio::test]
    async fn roundtrip_through_each_backend() {
        for cipher in [
            CredentialCipher::new(Some(FakeKeystore::available()), None),
            symmetric_only(),
            CredentialCipher::new(None, None),
        ] {
            let out = cipher.encrypt("s3cret").await.unwrap();
            assert_eq!(cipher.decrypt(&out.ciphertext, out.backend).await.unwrap(), "s3cret");
        }
    }

    #[tokio::test]
    async fn empty_plaintext_skips_backends() {
        let cipher = symmetric_only();
        let out = cipher.encrypt("").await.unwrap();
        assert_eq!(out.backend, BackendKind::Empty);
        assert_eq!(out.ciphertext, "");
        assert_eq!(cipher.decrypt("", BackendKind::Empty).await.unwrap(), "");
    }

    #[tokio::test]
    async fn encrypt_degrades_when_keystore_denies() {
        // Keystore claims availability but denies every call; encryption
        // must fall through to the symmetric backend, not error.
        let cipher = CredentialCipher::new(
            Some(FakeKeystore::denying()),
            Some(SymmetricKey::generate().unwrap()),
        );
        let out = cipher.encrypt("degrade me").await.unwrap();
        assert_eq!(out.backend, BackendKind::SymmetricKey);
        assert_eq!(
            cipher.decrypt(&out.ciphertext, out.backend).await.unwrap(),
            "degrade me"
        );
    }

    #[tokio::test]
    async fn decrypt_does_not_fall_back_for_unavailable_backend() {
        let cipher = CredentialCipher::new(Some(FakeKeystore::available()), None);
        let out = cipher.encrypt("locked in").await.unwrap();
        assert_eq!(out.backend, BackendKind::PlatformKeystore);

        // Same record read by a process without the keystore.
        let without = CredentialCipher::new(None, None);
        let err = without
            .decrypt(&out.ciphertext, out.backend)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CipherError::BackendUnavailable {
                backend: BackendKind::PlatformKeystore
            }
        ));
    }

    #[tokio::test]
    async fn auto_detect_finds_obfuscated_value() {
        let cipher = symmetric_only();
        let blob = obfuscate::obfuscate("legacy value");
        let (plain, backend) = cipher.auto_detect(&blob).await;
        assert_eq!(plain, "legacy value");
        assert_eq!(backend, Some(BackendKind::Obfuscation));
    }

    #[tokio::test]
    async fn auto_detect_treats_unknown_data_as_plaintext() {
        let cipher = symmetric_only();
        let (plain, backend) = cipher.auto_detect("just a plain password").await;
        assert_eq!(plain, "just a plain password");
        assert_eq!(backend, None);
    }
}
