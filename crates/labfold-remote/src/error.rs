// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed request errors.
//!
//! The retry policy dispatches on variants, never on message substrings:
//! the only place a response body is inspected is [`RequestError::classify`],
//! which turns the server's anti-forgery rejection into the [`Forgery`]
//! variant once, at classification time.
//!
//! [`Forgery`]: RequestError::Forgery

use thiserror::Error;

/// Errors from the transport session and the resilient request client.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The client was constructed with unusable settings (missing or
    /// malformed base URL).
    #[error("client configuration error: {0}")]
    Config(String),

    /// Anti-forgery token could not be acquired. Fatal for the call chain:
    /// there is no session without a token.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// The server rejected the request as a forgery (stale or mismatched
    /// token). Never retried: the same token cannot suddenly become valid.
    #[error("anti-forgery check failed: {0}")]
    Forgery(String),

    /// Connection-level failure (refused, reset, DNS, timeout). Retried.
    #[error("network failure: {0}")]
    Network(String),

    /// Non-success HTTP status that is not a forgery rejection. Retried.
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// The session's TTL has elapsed. The caller must re-establish before
    /// issuing mutating requests; the client never re-authenticates mid-call.
    #[error("session expired, re-establish before retrying")]
    SessionExpired,

    /// Every discovery candidate was exhausted. Carries the last error per
    /// candidate, in probe order.
    #[error("no usable endpoint among {} candidates", attempts.len())]
    NoUsableEndpoint { attempts: Vec<(String, String)> },

    /// The response body could not be interpreted.
    #[error("payload error: {0}")]
    Payload(String),
}

impl RequestError {
    /// Whether the retry loop may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Network(_) | RequestError::Server { .. })
    }

    /// Classify a non-success HTTP response.
    ///
    /// Django-style servers reject forgeries with 403 and a body naming the
    /// CSRF check; that marker is folded into the type here so no caller
    /// ever string-matches again.
    pub fn classify(status: u16, body: &str) -> Self {
        if status == 403 && body.contains("CSRF") {
            let detail = if body.contains("Origin checking failed") {
                "origin check failed (proxy configuration)"
            } else if body.contains("token missing") {
                "token missing from request"
            } else {
                "token validation failed"
            };
            return RequestError::Forgery(detail.to_string());
        }
        RequestError::Server {
            status,
            message: truncate(body, 200),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        RequestError::Network(err.to_string())
    }
}

impl From<RequestError> for labfold_core::LabfoldError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Config(msg) => labfold_core::LabfoldError::Config(msg),
            RequestError::TokenAcquisition(_) | RequestError::SessionExpired => {
                labfold_core::LabfoldError::Session(err.to_string())
            }
            other => labfold_core::LabfoldError::Request {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
