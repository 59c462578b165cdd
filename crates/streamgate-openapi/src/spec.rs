//! Spec loading, shallow `$ref` resolution and security-scheme lookup.
//!
//! Documents come from a local file path or an http(s) URL and are decoded as
//! JSON or YAML based on the source extension. Reference resolution is
//! internal-only and makes exactly one hop: a `$ref` that points at another
//! `$ref` is refused rather than expanded, which keeps cycle handling out of
//! the picture entirely.

use crate::error::{OpenApiError, Result};
use openapiv3::{OpenAPI, Operation, PathItem, ReferenceOr, RequestBody, Schema, SecurityRequirement};
use reqwest::Client;
use serde_json::{json, Value};

/// Security type assumed when a spec carries no usable security information.
pub const DEFAULT_SECURITY_TYPE: &str = "cloud-api-key";

const REQUEST_BODY_REF_PREFIX: &str = "#/components/requestBodies/";
const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Load an `OpenAPI` document from a file path or http(s) URL.
///
/// Network fetches with a non-200 status are rejected. Read and parse
/// failures are propagated verbatim.
///
/// # Errors
///
/// Returns an error if the source cannot be read, fetched, or parsed.
pub async fn load_spec(client: &Client, source: &str) -> Result<OpenAPI> {
    let content = if source.starts_with("http://") || source.starts_with("https://") {
        tracing::info!("fetching OpenAPI spec from {source}");
        let resp = client
            .get(source)
            .send()
            .await
            .map_err(|e| OpenApiError::SpecFetch {
                url: source.to_string(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        if status.as_u16() != 200 {
            return Err(OpenApiError::SpecStatus {
                url: source.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|e| OpenApiError::SpecFetch {
            url: source.to_string(),
            message: e.to_string(),
        })?
    } else {
        tracing::info!("loading OpenAPI spec from {source}");
        std::fs::read_to_string(source).map_err(|e| OpenApiError::SpecReadFile {
            path: source.to_string(),
            source: e,
        })?
    };

    parse_spec(&content, source)
}

/// Parse spec bytes as JSON or YAML, chosen by the source extension.
///
/// # Errors
///
/// Returns an error if the content does not parse as the expected format.
pub fn parse_spec(content: &str, source: &str) -> Result<OpenAPI> {
    if is_yaml_source(source) {
        serde_yaml::from_str(content).map_err(|e| OpenApiError::SpecParseYaml {
            location: source.to_string(),
            source: e,
        })
    } else {
        serde_json::from_str(content).map_err(|e| OpenApiError::SpecParseJson {
            location: source.to_string(),
            source: e,
        })
    }
}

fn is_yaml_source(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.ends_with(".yaml") || lower.ends_with(".yml")
}

/// Resolve a request-body `$ref` to its component, one hop at most.
///
/// An inline body is returned as-is. A `#/components/requestBodies/<name>`
/// reference is looked up in the components table; a missing component or a
/// component that is itself a reference yields `None`, which downstream code
/// treats the same as a body with no usable content.
#[must_use]
pub fn resolve_request_body<'a>(
    spec: &'a OpenAPI,
    body: &'a ReferenceOr<RequestBody>,
) -> Option<&'a RequestBody> {
    match body {
        ReferenceOr::Item(b) => Some(b),
        ReferenceOr::Reference { reference } => {
            let name = reference.strip_prefix(REQUEST_BODY_REF_PREFIX)?;
            match spec.components.as_ref()?.request_bodies.get(name)? {
                ReferenceOr::Item(b) => Some(b),
                ReferenceOr::Reference { reference } => {
                    tracing::warn!("refusing multi-hop request body $ref: {reference}");
                    None
                }
            }
        }
    }
}

/// Resolve a schema `$ref` (one hop) and coerce the result into the generic
/// `{type, properties, required, items}` JSON shape used downstream.
#[must_use]
pub fn resolve_schema_value(spec: &OpenAPI, schema: &ReferenceOr<Schema>) -> Option<Value> {
    match schema {
        ReferenceOr::Item(s) => Some(schema_to_json(s)),
        ReferenceOr::Reference { reference } => {
            let name = reference.strip_prefix(SCHEMA_REF_PREFIX)?;
            match spec.components.as_ref()?.schemas.get(name)? {
                ReferenceOr::Item(s) => Some(schema_to_json(s)),
                ReferenceOr::Reference { reference } => {
                    tracing::warn!("refusing multi-hop schema $ref: {reference}");
                    None
                }
            }
        }
    }
}

/// Convert an `OpenAPI` schema to a generic JSON Schema value.
///
/// Nested `$ref`s are kept verbatim; only the top level is flattened.
#[must_use]
pub fn schema_to_json(schema: &Schema) -> Value {
    let mut result = json!({});

    if let Some(desc) = &schema.schema_data.description {
        result["description"] = json!(desc);
    }

    match &schema.schema_kind {
        openapiv3::SchemaKind::Type(t) => match t {
            openapiv3::Type::String(s) => {
                result["type"] = json!("string");
                if !s.enumeration.is_empty() {
                    let enum_values: Vec<_> =
                        s.enumeration.iter().filter_map(Clone::clone).collect();
                    result["enum"] = json!(enum_values);
                }
            }
            openapiv3::Type::Number(_) => {
                result["type"] = json!("number");
            }
            openapiv3::Type::Integer(_) => {
                result["type"] = json!("integer");
            }
            openapiv3::Type::Boolean(_) => {
                result["type"] = json!("boolean");
            }
            openapiv3::Type::Array(a) => {
                result["type"] = json!("array");
                if let Some(items) = &a.items {
                    match items {
                        ReferenceOr::Item(item_schema) => {
                            result["items"] = schema_to_json(item_schema);
                        }
                        ReferenceOr::Reference { reference } => {
                            result["items"] = json!({ "$ref": reference });
                        }
                    }
                }
            }
            openapiv3::Type::Object(o) => {
                result["type"] = json!("object");
                let mut properties = json!({});
                for (name, prop) in &o.properties {
                    match prop {
                        ReferenceOr::Item(prop_schema) => {
                            properties[name] = schema_to_json(prop_schema);
                        }
                        ReferenceOr::Reference { reference } => {
                            properties[name] = json!({ "$ref": reference });
                        }
                    }
                }
                if !o.properties.is_empty() {
                    result["properties"] = properties;
                }
                if !o.required.is_empty() {
                    result["required"] = json!(o.required);
                }
            }
        },
        _ => {
            result["type"] = json!("object");
        }
    }

    result
}

/// Determine the security type for a (method, path) pair.
///
/// The path item is found by exact match first, then by template pattern
/// match. Operation-level security wins over the global list; the answer is
/// the first scheme name of the first requirement. `None` means the spec has
/// nothing to say and the caller should fall back to its own default.
#[must_use]
pub fn security_type_for_endpoint(spec: &OpenAPI, method: &str, path: &str) -> Option<String> {
    let global = || {
        spec.security
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| extract_security_type(s))
    };

    let Some(item) = find_path_item(spec, path) else {
        return global();
    };

    let Some(op) = operation_for_method(item, method) else {
        return global();
    };

    if let Some(sec) = op.security.as_ref().filter(|s| !s.is_empty()) {
        return Some(extract_security_type(sec));
    }

    global()
}

fn extract_security_type(requirements: &[SecurityRequirement]) -> String {
    requirements
        .first()
        .and_then(|req| req.keys().next())
        .cloned()
        .unwrap_or_else(|| DEFAULT_SECURITY_TYPE.to_string())
}

fn find_path_item<'a>(spec: &'a OpenAPI, path: &str) -> Option<&'a PathItem> {
    if let Some(item) = spec.paths.paths.get(path).and_then(ReferenceOr::as_item) {
        return Some(item);
    }

    spec.paths
        .paths
        .iter()
        .find(|(template, _)| matches_path_template(path, template))
        .and_then(|(_, item)| item.as_item())
}

/// Check whether a concrete request path matches a templated spec path, where
/// any `{name}` segment matches any value.
#[must_use]
pub fn matches_path_template(request_path: &str, template: &str) -> bool {
    let request_parts: Vec<&str> = request_path.trim_matches('/').split('/').collect();
    let template_parts: Vec<&str> = template.trim_matches('/').split('/').collect();

    if request_parts.len() != template_parts.len() {
        return false;
    }

    template_parts
        .iter()
        .zip(&request_parts)
        .all(|(tpl, req)| (tpl.starts_with('{') && tpl.ends_with('}')) || tpl == req)
}

/// Look up the operation for an HTTP method on a path item.
#[must_use]
pub fn operation_for_method<'a>(item: &'a PathItem, method: &str) -> Option<&'a Operation> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => item.get.as_ref(),
        "POST" => item.post.as_ref(),
        "PUT" => item.put.as_ref(),
        "DELETE" => item.delete.as_ref(),
        "PATCH" => item.patch.as_ref(),
        _ => None,
    }
}
