// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilient HTTP client for anti-forgery-protected imaging servers.
//!
//! [`TransportSession`] owns token acquisition and session expiry;
//! [`RemoteClient`] layers bounded retry and endpoint discovery on top;
//! [`ops`] provides the dataset/annotation operations. Forgery rejections
//! are never retried, transient faults are.

pub mod client;
pub mod error;
pub mod ops;
pub mod response;
pub mod session;

pub use client::{AttemptOutcome, Discovery, RemoteClient, RequestAttempt};
pub use error::RequestError;
pub use ops::{CreatedObject, NamedValue, OME_SCHEMA};
pub use response::{extract_object_id, ExtractedId, IdSource, ResponseEnvelope};
pub use session::{LoginMethod, Session, TransportSession};
