//! Endpoint mapping and the semantic tool registry.
//!
//! The registry is built once per spec load and read concurrently afterwards.
//! For any (action, resource) pair at most one mapping exists; later spec
//! entries for the same pair overwrite earlier ones.

use crate::action::{classify_action, SemanticAction, TELEMETRY_ACTION};
use crate::error::RegistryError;
use crate::resource::resource_from_path;
use crate::spec::{resolve_request_body, resolve_schema_value};
use openapiv3::{OpenAPI, Operation, PathItem, RequestBody};
use parking_lot::RwLock;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_VENDOR_JSON: &str = "application/vnd.confluent+json";

/// A resolved request-body schema with its content type.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodySchema {
    /// Generic `{type, properties, required, items}` JSON shape.
    pub schema: Value,
    pub content_type: String,
}

/// The endpoint bound to an (action, resource) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointMapping {
    pub method: Method,
    pub path_pattern: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub request_body: Option<RequestBodySchema>,
}

/// A generated semantic tool, ready for conversion into an MCP tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Action name for semantic tools; `METHOD PATH` for anything else.
    pub endpoint: String,
    /// JSON-schema `parameters` object advertised to clients.
    pub parameters: Value,
}

/// Registry mapping action → resource → endpoint.
///
/// Writers appear only at startup or on explicit spec reload; every other
/// access goes through the read lock.
#[derive(Debug, Default)]
pub struct SemanticRegistry {
    mappings: RwLock<HashMap<String, HashMap<String, EndpointMapping>>>,
}

impl SemanticRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the main spec, replacing prior main-spec state.
    pub fn load_main_spec(&self, spec: &OpenAPI) {
        let mut mappings = self.mappings.write();
        for action in SemanticAction::ALL {
            mappings.entry(action.as_str().to_string()).or_default().clear();
        }

        for (path, item) in &spec.paths.paths {
            let Some(item) = item.as_item() else { continue };
            let Some(resource) = resource_from_path(path) else {
                continue;
            };

            for (method, op) in operations(item) {
                let Some(action) = classify_action(method, path) else {
                    continue;
                };
                let mapping = build_mapping(spec, method, path, op);
                tracing::debug!(
                    action = %action,
                    resource = %resource,
                    method,
                    path,
                    required = ?mapping.required_params,
                    "mapped endpoint"
                );
                mappings
                    .entry(action.as_str().to_string())
                    .or_default()
                    .insert(resource.clone(), mapping);
            }
        }

        for (action, resources) in mappings.iter() {
            if !resources.is_empty() {
                tracing::debug!(action, resources = resources.len(), "registry action ready");
            }
        }
    }

    /// Map telemetry endpoints under the reserved `get_telemetry` action.
    ///
    /// The telemetry API is read-only: only GET and POST are mapped, POSTs
    /// being query-style reads. `dataset` is always required.
    pub fn load_telemetry_spec(&self, spec: &OpenAPI) {
        let mut mappings = self.mappings.write();
        let telemetry = mappings.entry(TELEMETRY_ACTION.to_string()).or_default();
        telemetry.clear();

        for (path, item) in &spec.paths.paths {
            let Some(item) = item.as_item() else { continue };
            let Some(resource) = resource_from_path(path) else {
                continue;
            };

            for (method, _op) in operations(item) {
                if method != "GET" && method != "POST" {
                    continue;
                }

                let mapping = EndpointMapping {
                    method: parse_method(method),
                    path_pattern: path.clone(),
                    required_params: vec!["dataset".to_string()],
                    optional_params: Vec::new(),
                    request_body: None,
                };
                tracing::debug!(resource = %resource, method, path, "mapped telemetry endpoint");
                telemetry.insert(resource.clone(), mapping);
            }
        }
    }

    /// Look up the endpoint mapping for a semantic (action, resource) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the action has no resources or the resource is not
    /// mapped under the action.
    pub fn mapping(&self, action: &str, resource: &str) -> Result<EndpointMapping, RegistryError> {
        let mappings = self.mappings.read();
        let resources = mappings
            .get(action)
            .ok_or_else(|| RegistryError::UnsupportedAction(action.to_string()))?;
        resources
            .get(resource)
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedResource {
                action: action.to_string(),
                resource: resource.to_string(),
            })
    }

    /// Look up the telemetry mapping for a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is not mapped under `get_telemetry`.
    pub fn telemetry_mapping(&self, resource: &str) -> Result<EndpointMapping, RegistryError> {
        let mappings = self.mappings.read();
        mappings
            .get(TELEMETRY_ACTION)
            .and_then(|resources| resources.get(resource))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTelemetryResource(resource.to_string()))
    }

    /// Required parameter names for an (action, resource) pair.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::mapping`].
    pub fn required_params(
        &self,
        action: &str,
        resource: &str,
    ) -> Result<Vec<String>, RegistryError> {
        Ok(self.mapping(action, resource)?.required_params)
    }

    /// A cloned view of the full action → resource → mapping table.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, HashMap<String, EndpointMapping>> {
        self.mappings.read().clone()
    }

    /// Generate one tool per action that has at least one resource mapped.
    ///
    /// Supported-resource lists are sorted so repeated generation over the
    /// same spec bytes yields identical tool lists.
    #[must_use]
    pub fn generate_tools(&self) -> Vec<ToolSpec> {
        let mappings = self.mappings.read();
        let mut tools = Vec::new();

        for action in SemanticAction::ALL {
            let Some(resources_map) = mappings.get(action.as_str()) else {
                continue;
            };
            if resources_map.is_empty() {
                continue;
            }

            let mut resources: Vec<String> = resources_map.keys().cloned().collect();
            resources.sort();

            tools.push(ToolSpec {
                name: action.as_str().to_string(),
                description: format!(
                    "{} resources. Supported resources: {}",
                    capitalize(action.as_str()),
                    resources.join(", ")
                ),
                endpoint: action.as_str().to_string(),
                parameters: semantic_tool_parameters(action.as_str(), &resources),
            });
        }

        if let Some(telemetry) = mappings.get(TELEMETRY_ACTION) {
            if !telemetry.is_empty() {
                let mut resources: Vec<String> = telemetry.keys().cloned().collect();
                resources.sort();

                tools.push(ToolSpec {
                    name: TELEMETRY_ACTION.to_string(),
                    description: format!(
                        "Get telemetry data from the Telemetry API. Supported resources: {}",
                        resources.join(", ")
                    ),
                    endpoint: TELEMETRY_ACTION.to_string(),
                    parameters: telemetry_tool_parameters(&resources),
                });
            }
        }

        tools
    }
}

fn operations(item: &PathItem) -> Vec<(&'static str, &Operation)> {
    let arms = [
        ("GET", item.get.as_ref()),
        ("POST", item.post.as_ref()),
        ("PUT", item.put.as_ref()),
        ("PATCH", item.patch.as_ref()),
        ("DELETE", item.delete.as_ref()),
    ];
    arms.into_iter()
        .filter_map(|(method, op)| op.map(|op| (method, op)))
        .collect()
}

fn parse_method(method: &str) -> Method {
    method.parse().unwrap_or(Method::GET)
}

fn build_mapping(spec: &OpenAPI, method: &str, path: &str, op: &Operation) -> EndpointMapping {
    let mut required = Vec::new();
    let mut optional = Vec::new();

    for param in &op.parameters {
        let Some(param) = param.as_item() else { continue };
        let data = param.parameter_data_ref();
        if data.required {
            required.push(data.name.clone());
        } else {
            optional.push(data.name.clone());
        }
    }

    // A path parameter must be provided even when the spec fails to declare
    // it required.
    for param in extract_path_parameters(path) {
        if !required.contains(&param) {
            required.push(param);
        }
    }

    let request_body = op
        .request_body
        .as_ref()
        .and_then(|body| resolve_request_body(spec, body))
        .and_then(|body| extract_body_schema(spec, body));

    if let Some(body) = &request_body {
        if let Some(fields) = body.schema.get("required").and_then(Value::as_array) {
            for field in fields.iter().filter_map(Value::as_str) {
                if !required.iter().any(|r| r == field) {
                    required.push(field.to_string());
                }
            }
        }
    }

    EndpointMapping {
        method: parse_method(method),
        path_pattern: path.to_string(),
        required_params: required,
        optional_params: optional,
        request_body,
    }
}

fn extract_body_schema(spec: &OpenAPI, body: &RequestBody) -> Option<RequestBodySchema> {
    for content_type in [CONTENT_TYPE_JSON, CONTENT_TYPE_VENDOR_JSON] {
        if let Some(media) = body.content.get(content_type) {
            if let Some(schema) = media.schema.as_ref().and_then(|s| resolve_schema_value(spec, s))
            {
                return Some(RequestBodySchema {
                    schema,
                    content_type: content_type.to_string(),
                });
            }
        }
    }

    body.content.iter().find_map(|(content_type, media)| {
        media
            .schema
            .as_ref()
            .and_then(|s| resolve_schema_value(spec, s))
            .map(|schema| RequestBodySchema {
                schema,
                content_type: content_type.clone(),
            })
    })
}

/// Extract `{name}` parameter names from a path template.
#[must_use]
pub fn extract_path_parameters(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|part| part.starts_with('{') && part.ends_with('}'))
        .map(|part| part.trim_matches(|c| c == '{' || c == '}').to_string())
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn semantic_tool_parameters(action: &str, resources: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "resource": {
                "type": "string",
                "description": format!("The type of resource to {action}"),
                "enum": resources,
            },
            "parameters": {
                "type": "object",
                "description": "Parameters specific to the chosen resource and action",
                "properties": {},
            },
        },
        "required": ["resource"],
    })
}

fn telemetry_tool_parameters(resources: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "resource": {
                "type": "string",
                "description": "The type of telemetry resource to get",
                "enum": resources,
            },
            "dataset": {
                "type": "string",
                "description": "The dataset to query (e.g. 'cloud', 'cloud-custom')",
            },
            "parameters": {
                "type": "object",
                "description": "Additional parameters specific to the telemetry resource",
                "properties": {},
            },
        },
        "required": ["resource", "dataset"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN_SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: cloud
  version: "1"
paths:
  /iam/v2/environments:
    get:
      summary: List environments
      responses:
        "200": { description: ok }
    post:
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [display_name]
              properties:
                display_name: { type: string }
      responses:
        "201": { description: created }
  /iam/v2/environments/{id}:
    get:
      responses:
        "200": { description: ok }
    delete:
      responses:
        "204": { description: gone }
  /kafka/v3/clusters/{cluster_id}/topics:
    get:
      responses:
        "200": { description: ok }
    post:
      requestBody:
        $ref: '#/components/requestBodies/CreateTopicRequest'
      responses:
        "201": { description: created }
  /kafka/v3/clusters/{cluster_id}/topics/{topic_name}:
    get:
      parameters:
        - name: include_authorized_operations
          in: query
          required: false
          schema: { type: boolean }
      responses:
        "200": { description: ok }
  /iam/v2/service-accounts/{id}:
    patch:
      responses:
        "200": { description: ok }
components:
  requestBodies:
    CreateTopicRequest:
      content:
        application/json:
          schema:
            $ref: '#/components/schemas/CreateTopicRequestData'
  schemas:
    CreateTopicRequestData:
      type: object
      required: [topic_name]
      properties:
        topic_name: { type: string }
        partitions_count: { type: integer }
        replication_factor: { type: integer }
        configs:
          type: array
          items: { type: object }
"#;

    const TELEMETRY_SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: telemetry
  version: "1"
paths:
  /v2/metrics/{dataset}/descriptors/metrics:
    get:
      responses:
        "200": { description: ok }
  /v2/metrics/{dataset}/query:
    post:
      responses:
        "200": { description: ok }
"#;

    fn registry() -> SemanticRegistry {
        let main: OpenAPI = serde_yaml::from_str(MAIN_SPEC).unwrap();
        let telemetry: OpenAPI = serde_yaml::from_str(TELEMETRY_SPEC).unwrap();
        let registry = SemanticRegistry::new();
        registry.load_main_spec(&main);
        registry.load_telemetry_spec(&telemetry);
        registry
    }

    #[test]
    fn path_parameters_are_always_required() {
        let registry = registry();
        for (action, resources) in registry.snapshot() {
            for (resource, mapping) in resources {
                for param in extract_path_parameters(&mapping.path_pattern) {
                    assert!(
                        mapping.required_params.contains(&param),
                        "{action} {resource}: path parameter {param} missing from required"
                    );
                }
            }
        }
    }

    #[test]
    fn create_topics_unions_schema_required_fields() {
        let registry = registry();
        let mapping = registry.mapping("create", "topics").unwrap();
        assert_eq!(mapping.method, Method::POST);
        assert!(mapping.required_params.contains(&"cluster_id".to_string()));
        assert!(mapping.required_params.contains(&"topic_name".to_string()));

        let body = mapping.request_body.unwrap();
        assert_eq!(body.content_type, "application/json");
        assert_eq!(body.schema["properties"]["partitions_count"]["type"], "integer");
    }

    #[test]
    fn optional_query_parameters_stay_optional() {
        let registry = registry();
        let mapping = registry.mapping("get", "topics").unwrap();
        assert!(mapping
            .optional_params
            .contains(&"include_authorized_operations".to_string()));
    }

    #[test]
    fn patch_on_instance_maps_to_update() {
        let registry = registry();
        let mapping = registry.mapping("update", "service-accounts").unwrap();
        assert_eq!(mapping.path_pattern, "/iam/v2/service-accounts/{id}");
        assert_eq!(mapping.method, Method::PATCH);
    }

    #[test]
    fn lookup_errors_name_the_missing_piece() {
        let registry = registry();
        let err = registry.mapping("create", "nonexistent").unwrap_err();
        assert!(err.to_string().contains("nonexistent"));

        let err = registry.mapping("refresh", "topics").unwrap_err();
        assert!(err.to_string().contains("refresh"));
    }

    #[test]
    fn telemetry_requires_dataset() {
        let registry = registry();
        let mapping = registry.telemetry_mapping("metrics").unwrap();
        assert_eq!(mapping.required_params, vec!["dataset".to_string()]);

        let err = registry.telemetry_mapping("nonexistent").unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn generates_one_tool_per_nonempty_action() {
        let registry = registry();
        let tools = registry.generate_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();

        assert!(names.contains(&"create"));
        assert!(names.contains(&"list"));
        assert!(names.contains(&"get"));
        assert!(names.contains(&"update"));
        assert!(names.contains(&"delete"));
        assert!(names.contains(&"get_telemetry"));
    }

    #[test]
    fn tool_parameters_advertise_sorted_resource_enum() {
        let registry = registry();
        let tools = registry.generate_tools();
        let list = tools.iter().find(|t| t.name == "list").unwrap();

        let resources: Vec<&str> = list.parameters["properties"]["resource"]["enum"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        let mut sorted = resources.clone();
        sorted.sort_unstable();
        assert_eq!(resources, sorted);
        assert_eq!(list.parameters["required"], json!(["resource"]));

        let telemetry = tools.iter().find(|t| t.name == "get_telemetry").unwrap();
        assert_eq!(telemetry.parameters["required"], json!(["resource", "dataset"]));
    }

    #[test]
    fn rebuilding_from_same_bytes_is_deterministic() {
        let tools_a = registry().generate_tools();
        let tools_b = registry().generate_tools();
        assert_eq!(tools_a, tools_b);
    }
}
