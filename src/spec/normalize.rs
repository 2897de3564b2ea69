//! Endpoint Normalizer: flattens heterogeneous per-domain OpenAPI
//! documents into one canonical, deterministically ordered snapshot.
//!
//! Only the structural subset we reconcile against is read (`paths`,
//! parameters, request bodies); everything else in the documents is
//! ignored. Normalizing the same documents twice yields byte-identical
//! endpoint maps.

use crate::error::SyncError;
use crate::model::{Endpoint, HttpMethod, ParamDef, ParamLocation, Snapshot};
use crate::spec::source::{SpecFetch, SpecSource};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

const FORM_CONTENT: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT: &str = "application/json";

/// Fetch every tracked domain's document and normalize into a snapshot.
///
/// Domains the provider does not publish for this release contribute zero
/// endpoints; any other fetch failure aborts the stage.
pub async fn build_snapshot(
    source: &dyn SpecSource,
    version: &str,
    domains: &[String],
    concurrency: usize,
) -> Result<Snapshot, SyncError> {
    let fetches = stream::iter(domains.iter().cloned())
        .map(|domain| async move {
            let outcome = source.fetch_spec(version, &domain).await;
            (domain, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut endpoints: BTreeMap<String, Endpoint> = BTreeMap::new();
    for (domain, outcome) in fetches {
        match outcome? {
            SpecFetch::NotFound => {
                warn!(domain, version, "no spec document published; skipping domain");
            }
            SpecFetch::Document(doc) => {
                let domain_endpoints = normalize_document(&domain, &doc)?;
                info!(
                    domain,
                    count = domain_endpoints.len(),
                    "normalized domain document"
                );
                for endpoint in domain_endpoints {
                    // Keys are unique by construction: one method cannot
                    // repeat under the same path within one document.
                    endpoints.insert(endpoint.key(), endpoint);
                }
            }
        }
    }

    Ok(Snapshot::new(version, endpoints))
}

/// Normalize one domain document into endpoint records.
pub fn normalize_document(domain: &str, doc: &Value) -> Result<Vec<Endpoint>, SyncError> {
    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| SyncError::MalformedSpec {
            domain: domain.to_string(),
            message: "document has no `paths` object".to_string(),
        })?;

    let mut endpoints = Vec::new();
    for (path, path_item) in paths {
        let path_level_params = parse_parameters(path_item.get("parameters"));

        for method in HttpMethod::ALL {
            let Some(operation) = path_item.get(method.to_string()) else {
                continue;
            };
            let op_params = parse_parameters(operation.get("parameters"));
            let parameters = merge_parameters(&path_level_params, op_params);
            let request_body = parse_request_body(operation.get("requestBody"));

            endpoints.push(Endpoint {
                domain: domain.to_string(),
                path: path.clone(),
                method,
                operation_id: str_field(operation, "operationId"),
                summary: str_field(operation, "summary"),
                deprecated: operation
                    .get("deprecated")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                parameters,
                request_body,
            });
        }
    }
    Ok(endpoints)
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse an OpenAPI `parameters` array, keeping only path and query
/// parameters.
fn parse_parameters(value: Option<&Value>) -> Vec<ParamDef> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            let location = match item.get("in")?.as_str()? {
                "path" => ParamLocation::Path,
                "query" => ParamLocation::Query,
                _ => return None,
            };
            Some(ParamDef {
                name,
                location,
                required: item.get("required").and_then(Value::as_bool).unwrap_or(false),
                param_type: item
                    .get("schema")
                    .and_then(|s| s.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("string")
                    .to_string(),
                description: str_field(item, "description"),
            })
        })
        .collect()
}

/// Union path-level parameters into the operation-level list. Path-level
/// parameters apply to every method under the path; an operation-level
/// declaration with the same `(name, in)` pair wins.
fn merge_parameters(path_level: &[ParamDef], op_level: Vec<ParamDef>) -> Vec<ParamDef> {
    let mut merged = op_level;
    for param in path_level {
        let already = merged
            .iter()
            .any(|p| p.name == param.name && p.location == param.location);
        if !already {
            merged.push(param.clone());
        }
    }
    merged
}

/// Extract request-body fields. Form encoding is preferred when the
/// provider declares both form and JSON variants for the same operation.
fn parse_request_body(value: Option<&Value>) -> Vec<ParamDef> {
    let Some(content) = value.and_then(|b| b.get("content")) else {
        return Vec::new();
    };
    let schema = content
        .get(FORM_CONTENT)
        .or_else(|| content.get(JSON_CONTENT))
        .and_then(|c| c.get("schema"));
    let Some(schema) = schema else {
        return Vec::new();
    };

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| ParamDef {
            name: name.clone(),
            location: ParamLocation::Body,
            required: required.contains(&name.as_str()),
            param_type: prop
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string")
                .to_string(),
            description: str_field(prop, "description"),
        })
        .collect()
}
