// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./labfold.toml` > `~/.config/labfold/labfold.toml`
//! > `/etc/labfold/labfold.toml` with environment variable overrides via
//! `LABFOLD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LabfoldConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/labfold/labfold.toml` (system-wide)
/// 3. `~/.config/labfold/labfold.toml` (user XDG config)
/// 4. `./labfold.toml` (local directory)
/// 5. `LABFOLD_*` environment variables
pub fn load_config() -> Result<LabfoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LabfoldConfig::default()))
        .merge(Toml::file("/etc/labfold/labfold.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("labfold/labfold.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("labfold.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<LabfoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LabfoldConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LabfoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LabfoldConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `LABFOLD_REMOTE_SESSION_TTL_MS` must map
/// to `remote.session_ttl_ms`, not `remote.session.ttl.ms`.
fn env_provider() -> Env {
    Env::prefixed("LABFOLD_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("vault_", "vault.", 1)
            .replacen("remote_", "remote.", 1);
        mapped.into()
    })
}
