// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the Labfold workspace.

use thiserror::Error;

/// The primary error type used across Labfold crates.
///
/// Subsystems define richer enums of their own (`CipherError` in
/// labfold-vault, `RequestError` in labfold-remote) and convert into this
/// at the workspace surface.
#[derive(Debug, Error)]
pub enum LabfoldError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential vault errors (cipher backend failure, corrupted record, key material).
    #[error("vault error: {0}")]
    Vault(String),

    /// Transport session errors (token acquisition, login, expiry).
    #[error("session error: {0}")]
    Session(String),

    /// Remote request errors (network, server, anti-forgery rejection).
    #[error("request error: {message}")]
    Request {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
