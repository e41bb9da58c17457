// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cipher backend tags and the vault error type.
//!
//! Every ciphertext a backend produces is stored together with the tag of
//! the backend that produced it, so records are self-describing and decrypt
//! dispatch never has to guess.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which cipher backend produced a given ciphertext.
///
/// The serialized form is stored in every [`SecretRecord`](crate::vault::SecretRecord);
/// the aliases accept records written by earlier releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OS-level secret store exposed by the hosting shell.
    #[serde(alias = "electronSafeStorage")]
    PlatformKeystore,
    /// AES-256-GCM with a locally persisted random key.
    #[serde(alias = "browserCrypto")]
    SymmetricKey,
    /// Keyed XOR obfuscation, always available, not cryptographically strong.
    #[serde(alias = "fallbackBase64")]
    Obfuscation,
    /// Empty plaintext -- no backend was invoked.
    Empty,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::PlatformKeystore => "platform_keystore",
            BackendKind::SymmetricKey => "symmetric_key",
            BackendKind::Obfuscation => "obfuscation",
            BackendKind::Empty => "empty",
        };
        f.write_str(s)
    }
}

impl FromStr for BackendKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_keystore" | "electronSafeStorage" => Ok(BackendKind::PlatformKeystore),
            "symmetric_key" | "browserCrypto" => Ok(BackendKind::SymmetricKey),
            "obfuscation" | "fallbackBase64" => Ok(BackendKind::Obfuscation),
            "empty" => Ok(BackendKind::Empty),
            other => Err(CipherError::UnknownMethod(other.to_string())),
        }
    }
}

/// Result of an encryption call: the ciphertext plus the tag of the backend
/// that actually ran (which may be lower-priority than the preferred one).
#[derive(Debug, Clone)]
pub struct CipherOutput {
    pub ciphertext: String,
    pub backend: BackendKind,
}

/// Errors from the cipher backends and their dispatcher.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The tagged backend cannot run right now (keystore absent or denied,
    /// key material missing). Decryption never falls back past this.
    #[error("cipher backend {backend} is unavailable")]
    BackendUnavailable { backend: BackendKind },

    /// A backend accepted the call but failed to encrypt.
    #[error("{backend} encryption failed: {message}")]
    EncryptionFailed {
        backend: BackendKind,
        message: String,
    },

    /// A backend accepted the call but failed to decrypt (wrong key,
    /// corrupted or foreign ciphertext).
    #[error("{backend} decryption failed: {message}")]
    DecryptionFailed {
        backend: BackendKind,
        message: String,
    },

    /// The record's method tag does not match any backend this build knows.
    #[error("unknown encryption method: {0}")]
    UnknownMethod(String),

    /// Key material could not be generated, persisted, or reloaded.
    #[error("key material error: {0}")]
    KeyMaterial(String),
}

impl From<CipherError> for labfold_core::LabfoldError {
    fn from(err: CipherError) -> Self {
        labfold_core::LabfoldError::Vault(err.to_string())
    }
}
