// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The platform keystore boundary.
//!
//! The hosting shell may expose an OS-level secret store (Keychain, DPAPI,
//! libsecret). The vault talks to it through this trait; the call crosses a
//! privileged boundary, so both operations are async. Absence of an
//! implementation is treated as the capability being unavailable.

use async_trait::async_trait;

use crate::backend::{BackendKind, CipherError};

/// Injected capability object for the OS-level secret store.
///
/// `encrypt` returns an opaque string only the same installation can
/// decrypt. The store may deny access at any time (e.g. the user declines
/// a keychain prompt); implementations should surface that as
/// [`CipherError::BackendUnavailable`].
#[async_trait]
pub trait PlatformKeystore: Send + Sync {
    /// Whether the keystore can currently be used.
    fn is_available(&self) -> bool;

    /// Encrypt a plaintext into an opaque, installation-bound string.
    async fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    /// Decrypt an opaque string produced by [`encrypt`](Self::encrypt).
    async fn decrypt(&self, opaque: &str) -> Result<String, CipherError>;
}

/// Shorthand for the unavailable error this backend raises.
pub(crate) fn unavailable() -> CipherError {
    CipherError::BackendUnavailable {
        backend: BackendKind::PlatformKeystore,
    }
}
