// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! High-level imaging-server operations built on [`RemoteClient`].
//!
//! Object creation endpoints vary across server versions, so annotation
//! writes go through endpoint discovery while the stable dataset and link
//! routes are addressed directly.

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{Discovery, RemoteClient};
use crate::error::RequestError;
use crate::response::{extract_object_id, ExtractedId, ResponseEnvelope};

/// Schema namespace for typed object payloads.
pub const OME_SCHEMA: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// Annotation endpoints known across server versions, in preference order.
const ANNOTATION_CANDIDATES: [&str; 5] = [
    "api/v0/m/annotations/",
    "webclient/api/annotations/",
    "api/v0/m/mapannotations/",
    "webgateway/annotation/",
    "webclient/api/mapannotations/",
];

/// Result of a create call: the new object's id when the server disclosed
/// one, plus the raw response for callers that need more.
#[derive(Debug)]
pub struct CreatedObject {
    pub id: Option<ExtractedId>,
    pub endpoint: String,
    pub response: ResponseEnvelope,
}

impl CreatedObject {
    fn from_response(endpoint: &str, response: ResponseEnvelope) -> Self {
        let id = extract_object_id(&response);
        if let Some(extracted) = &id {
            debug!(endpoint, id = extracted.id, source = ?extracted.source, "object id resolved");
        } else {
            debug!(endpoint, "response carried no recognizable object id");
        }
        Self {
            id,
            endpoint: endpoint.to_string(),
            response,
        }
    }
}

/// Key/value pair for a map annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Create a dataset and return its id when the server reports one.
pub async fn create_dataset(
    client: &RemoteClient,
    name: &str,
    description: &str,
) -> Result<CreatedObject, RequestError> {
    let endpoint = "api/v0/m/datasets/";
    let payload = json!({
        "name": name,
        "description": description,
    });
    let response = client.request(Method::POST, endpoint, Some(&payload)).await?;
    info!(name, "dataset created");
    Ok(CreatedObject::from_response(endpoint, response))
}

/// Link an existing dataset under a project.
pub async fn link_dataset_to_project(
    client: &RemoteClient,
    project_id: u64,
    dataset_id: u64,
) -> Result<CreatedObject, RequestError> {
    let endpoint = "api/v0/m/projectdatasetlinks/";
    let payload = json!({
        "parent": {
            "@type": format!("{OME_SCHEMA}#Project"),
            "@id": project_id,
        },
        "child": {
            "@type": format!("{OME_SCHEMA}#Dataset"),
            "@id": dataset_id,
        },
    });
    let response = client.request(Method::POST, endpoint, Some(&payload)).await?;
    info!(project_id, dataset_id, "dataset linked to project");
    Ok(CreatedObject::from_response(endpoint, response))
}

/// Create a map annotation, discovering which annotation endpoint this
/// server version supports.
pub async fn create_map_annotation(
    client: &RemoteClient,
    pairs: &[NamedValue],
    namespace: &str,
) -> Result<(CreatedObject, Discovery), RequestError> {
    let values: Vec<Value> = pairs
        .iter()
        .map(|pair| {
            json!({
                "@type": format!("{OME_SCHEMA}#NamedValue"),
                "name": pair.name,
                "value": pair.value,
            })
        })
        .collect();
    let payload = json!({
        "@type": format!("{OME_SCHEMA}#MapAnnotation"),
        "ns": namespace,
        "mapValue": values,
    });

    let discovery = client
        .request_with_discovery(
            "map_annotation",
            Method::POST,
            &ANNOTATION_CANDIDATES,
            Some(&payload),
        )
        .await?;
    info!(endpoint = %discovery.endpoint, pairs = pairs.len(), "map annotation created");

    let created = CreatedObject::from_response(&discovery.endpoint, discovery.response.clone());
    Ok((created, discovery))
}

/// Attach a map annotation to an object (e.g. `"dataset"` or `"project"`).
///
/// The link body is schema-typed on both sides: the parent type name is
/// derived from `object_type` (`dataset` becomes `#DatasetAnnotationLink`).
pub async fn link_annotation(
    client: &RemoteClient,
    object_type: &str,
    object_id: u64,
    annotation_id: u64,
) -> Result<CreatedObject, RequestError> {
    let endpoint = format!("webclient/api/{object_type}annotationlinks/");
    let type_name = capitalize(object_type);
    let payload = json!({
        "@type": format!("{OME_SCHEMA}#{type_name}AnnotationLink"),
        "parent": {
            "@type": format!("{OME_SCHEMA}#{type_name}"),
            "@id": object_id,
        },
        "child": {
            "@type": format!("{OME_SCHEMA}#MapAnnotation"),
            "@id": annotation_id,
        },
    });
    let response = client
        .request(Method::POST, &endpoint, Some(&payload))
        .await?;
    info!(object_type, object_id, annotation_id, "annotation linked");
    Ok(CreatedObject::from_response(&endpoint, response))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// List projects visible to the current session.
pub async fn list_projects(client: &RemoteClient) -> Result<Vec<Value>, RequestError> {
    let response = client
        .request(Method::GET, "api/v0/m/projects/", None)
        .await?;
    let projects = response
        .body
        .get("data")
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();
    debug!(count = projects.len(), "projects listed");
    Ok(projects)
}

/// List the groups the current user belongs to.
pub async fn list_groups(client: &RemoteClient) -> Result<Vec<Value>, RequestError> {
    let response = client
        .request(Method::GET, "api/v0/m/experimentergroups/", None)
        .await?;
    let groups = response
        .body
        .get("data")
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();
    debug!(count = groups.len(), "groups listed");
    Ok(groups)
}
