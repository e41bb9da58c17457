// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot migration of legacy plaintext credentials into vault records.
//!
//! The external settings layer hands over its plaintext values; each known
//! sensitive key is encrypted and stored, and a per-key report is returned.
//! Migration is best-effort: one failing key never aborts the rest, and
//! re-running on already-migrated data is a no-op because the caller clears
//! the plaintext source after a successful run.

use std::collections::{BTreeMap, HashMap};

use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::vault::{mask_secret, CredentialVault};

/// The settings keys that hold credentials and must never stay plaintext.
/// The username is included: paired with a hostname it is half a login.
pub const SENSITIVE_KEYS: [&str; 3] = ["elab.api_key", "imaging.password", "imaging.username"];

/// Report of what the migration did.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Keys that were encrypted and stored.
    pub migrated: Vec<String>,
    /// Keys already present as vault records (left untouched).
    pub skipped: Vec<String>,
    /// Keys that failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Migrate plaintext values for the known sensitive keys into the vault.
///
/// Keys absent from `plaintext_values` or holding empty values are ignored.
pub async fn migrate_legacy(
    vault: &CredentialVault,
    plaintext_values: &HashMap<String, String>,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    for key in SENSITIVE_KEYS {
        let Some(value) = plaintext_values.get(key) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }

        // Idempotency: an existing record means a previous run already
        // migrated this key.
        match vault.retrieve(key).await {
            Ok(existing) if !existing.expose_secret().is_empty() => {
                info!(key = %key, "already migrated, skipping");
                report.skipped.push(key.to_string());
                continue;
            }
            _ => {}
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("migrated_at".to_string(), chrono::Utc::now().to_rfc3339());

        match vault.store(key, value, metadata).await {
            Ok(()) => {
                info!(
                    key = %key,
                    value = %mask_secret(value),
                    "migrated plaintext credential into vault"
                );
                report.migrated.push(key.to_string());
            }
            Err(e) => {
                warn!(key = %key, error = %e, "credential migration failed");
                report.failed.push((key.to_string(), e.to_string()));
            }
        }
    }

    report
}
