// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Labfold research-data tool.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Labfold configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LabfoldConfig {
    /// Credential vault settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Remote image-server settings.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Credential vault configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Path to the symmetric key file. Defaults to
    /// `~/.local/share/labfold/vault.key` (or the platform data dir).
    #[serde(default)]
    pub key_file: Option<String>,
}

impl VaultConfig {
    /// Resolve the key file path, falling back to the platform data dir.
    pub fn key_file_path(&self) -> std::path::PathBuf {
        match &self.key_file {
            Some(path) => std::path::PathBuf::from(path),
            None => dirs::data_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join("labfold/vault.key"),
        }
    }
}

/// Remote image-server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL of the remote server, e.g. `https://omero.example.org`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Verify TLS certificates. Disable only for test servers.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Session lifetime in milliseconds. Expired sessions must be
    /// re-established before use.
    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,

    /// Maximum attempts per request before surfacing the last error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for linear backoff between retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            verify_tls: default_verify_tls(),
            session_ttl_ms: default_session_ttl_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_verify_tls() -> bool {
    true
}

fn default_session_ttl_ms() -> u64 {
    600_000 // 10 minutes
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Normalize a server URL: add an https scheme if missing and ensure a
/// trailing slash so endpoint paths can be appended directly.
pub fn format_base_url(server_url: &str) -> Option<String> {
    let trimmed = server_url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    Some(url)
}
