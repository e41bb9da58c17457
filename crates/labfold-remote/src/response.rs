// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response normalization.
//!
//! Server deployments differ in where a created object's identifier lands
//! in the response. Each known shape gets one pure extraction function and
//! [`extract_object_id`] dispatches over them in a fixed priority order,
//! returning `None` (never an error) when nothing matches.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// A normalized HTTP response: final status, the `Location` header if the
/// server sent one, and the body parsed as JSON (`Null` for non-JSON bodies).
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub location: Option<String>,
    pub body: Value,
}

impl ResponseEnvelope {
    /// Whether a discovery probe should accept this response: a success
    /// status carrying something that looks like object data.
    pub fn is_usable(&self) -> bool {
        if !(200..300).contains(&self.status) {
            return false;
        }
        self.body.get("data").is_some()
            || self.body.get("@id").is_some()
            || self.body.get("id").is_some()
            || self.body.is_array()
    }
}

/// Which shape strategy produced an extracted identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// `body.data["@id"]` -- the standard API shape.
    NestedAtId,
    /// `body.data.id`
    NestedId,
    /// `body["@id"]`
    RootAtId,
    /// `body.id`
    RootId,
    /// `body.data[0]["@id"]` or `body.data[0].id` -- array-wrapped.
    ArrayWrapped,
    /// Trailing numeric segment of the `Location` header.
    LocationHeader,
    /// Last resort: pattern search over the serialized body.
    PatternSearch,
}

/// An identifier found in a response, with the shape that yielded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedId {
    pub id: u64,
    pub source: IdSource,
}

/// Pull the created-object identifier out of a response, trying each known
/// shape in priority order. Returns `None` if nothing matches; deciding
/// whether that is fatal belongs to the caller.
pub fn extract_object_id(envelope: &ResponseEnvelope) -> Option<ExtractedId> {
    let body = &envelope.body;

    let strategies: [(IdSource, Option<u64>); 5] = [
        (IdSource::NestedAtId, nested_at_id(body)),
        (IdSource::NestedId, nested_id(body)),
        (IdSource::RootAtId, root_at_id(body)),
        (IdSource::RootId, root_id(body)),
        (IdSource::ArrayWrapped, array_wrapped(body)),
    ];
    for (source, found) in strategies {
        if let Some(id) = found {
            return Some(ExtractedId { id, source });
        }
    }

    if let Some(id) = location_header(envelope.location.as_deref()) {
        return Some(ExtractedId {
            id,
            source: IdSource::LocationHeader,
        });
    }

    pattern_search(body).map(|id| ExtractedId {
        id,
        source: IdSource::PatternSearch,
    })
}

fn as_u64(value: &Value) -> Option<u64> {
    value.as_u64()
}

fn nested_at_id(body: &Value) -> Option<u64> {
    body.get("data")?.get("@id").and_then(as_u64)
}

fn nested_id(body: &Value) -> Option<u64> {
    body.get("data")?.get("id").and_then(as_u64)
}

fn root_at_id(body: &Value) -> Option<u64> {
    body.get("@id").and_then(as_u64)
}

fn root_id(body: &Value) -> Option<u64> {
    body.get("id").and_then(as_u64)
}

fn array_wrapped(body: &Value) -> Option<u64> {
    let first = body.get("data")?.as_array()?.first()?;
    first
        .get("@id")
        .and_then(as_u64)
        .or_else(|| first.get("id").and_then(as_u64))
}

fn location_header(location: Option<&str>) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/(\d+)/?$").expect("valid regex"));
    let caps = re.captures(location?)?;
    caps.get(1)?.as_str().parse().ok()
}

fn pattern_search(body: &Value) -> Option<u64> {
    if body.is_null() {
        return None;
    }
    static AT_ID: OnceLock<Regex> = OnceLock::new();
    static ID: OnceLock<Regex> = OnceLock::new();
    let at_id = AT_ID.get_or_init(|| Regex::new(r#""@id":\s*(\d+)"#).expect("valid regex"));
    let id = ID.get_or_init(|| Regex::new(r#""id":\s*(\d+)"#).expect("valid regex"));

    let serialized = body.to_string();
    // A literal "@id" field outranks a plain "id" field anywhere in the body.
    let caps = at_id
        .captures(&serialized)
        .or_else(|| id.captures(&serialized))?;
    caps.get(1)?.as_str().parse().ok()
}
