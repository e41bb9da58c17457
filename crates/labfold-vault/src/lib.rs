// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered credential encryption vault for the Labfold research-data tool.
//!
//! Secrets are protected by the best available platform capability with
//! graceful degradation: an OS-level keystore when the hosting shell exposes
//! one, AES-256-GCM with a locally persisted key otherwise, and a keyed
//! obfuscation fallback that is always available. Every ciphertext is tagged
//! with the backend that produced it, so records are self-describing.

pub mod backend;
pub mod cipher;
pub mod migration;
pub mod obfuscate;
pub mod platform;
pub mod symmetric;
pub mod vault;

pub use backend::{BackendKind, CipherError, CipherOutput};
pub use cipher::{CapabilitySet, CredentialCipher};
pub use migration::{migrate_legacy, MigrationReport, SENSITIVE_KEYS};
pub use platform::PlatformKeystore;
pub use symmetric::SymmetricKey;
pub use vault::{mask_secret, CredentialVault, MemoryStore, RecordStore, SecretRecord};
