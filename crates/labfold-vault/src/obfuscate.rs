// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reversible keyed obfuscation, the always-available last-resort backend.
//!
//! A per-call random salt is XORed as a repeating byte stream over the
//! plaintext, and salt + transformed bytes are encoded together so the blob
//! is self-contained. This is obfuscation, not encryption: it keeps
//! credentials out of casual view but will not resist an attacker who can
//! run code on the machine.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, CipherError};

const SALT_LEN: usize = 32;

/// Wire shape of the blob: base64 of this JSON, with `data` the base64 of
/// the XOR-transformed plaintext bytes. Matches the legacy fallback format.
#[derive(Serialize, Deserialize)]
struct ObfuscatedBlob {
    data: String,
    salt: String,
}

/// Obfuscate plaintext with a fresh random salt. Infallible in practice.
pub fn obfuscate(plaintext: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();

    let transformed = xor_stream(plaintext.as_bytes(), salt.as_bytes());
    let blob = ObfuscatedBlob {
        data: BASE64.encode(transformed),
        salt,
    };
    // Serialization of two strings cannot fail.
    let json = serde_json::to_string(&blob).expect("obfuscated blob serializes");
    BASE64.encode(json)
}

/// Reverse [`obfuscate`]. Fails on malformed blobs (foreign ciphertext).
pub fn deobfuscate(encoded: &str) -> Result<String, CipherError> {
    let failed = |message: String| CipherError::DecryptionFailed {
        backend: BackendKind::Obfuscation,
        message,
    };

    let json = BASE64
        .decode(encoded)
        .map_err(|e| failed(format!("invalid outer base64: {e}")))?;
    let blob: ObfuscatedBlob =
        serde_json::from_slice(&json).map_err(|e| failed(format!("invalid blob: {e}")))?;
    let transformed = BASE64
        .decode(&blob.data)
        .map_err(|e| failed(format!("invalid inner base64: {e}")))?;

    let plain = xor_stream(&transformed, blob.salt.as_bytes());
    String::from_utf8(plain).map_err(|e| failed(format!("result is not valid UTF-8: {e}")))
}

/// XOR `input` against the repeating `salt` byte stream. Self-inverse.
fn xor_stream(input: &[u8], salt: &[u8]) -> Vec<u8> {
    input
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ salt[i % salt.len()])
        .collect()
}
