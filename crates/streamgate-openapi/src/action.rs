//! Semantic action classification for (method, path) pairs.

use std::fmt;

/// The semantic verbs exposed to MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticAction {
    Create,
    List,
    Get,
    Update,
    Delete,
}

impl SemanticAction {
    /// All semantic actions, in the order tools are generated.
    pub const ALL: [SemanticAction; 5] = [
        SemanticAction::Create,
        SemanticAction::List,
        SemanticAction::Get,
        SemanticAction::Update,
        SemanticAction::Delete,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SemanticAction::Create => "create",
            SemanticAction::List => "list",
            SemanticAction::Get => "get",
            SemanticAction::Update => "update",
            SemanticAction::Delete => "delete",
        }
    }

    /// Parse a tool name back into a semantic action.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(SemanticAction::Create),
            "list" => Some(SemanticAction::List),
            "get" => Some(SemanticAction::Get),
            "update" => Some(SemanticAction::Update),
            "delete" => Some(SemanticAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for SemanticAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reserved action name for the telemetry tool.
pub const TELEMETRY_ACTION: &str = "get_telemetry";

/// POST suffixes that mutate existing state rather than create it.
const POST_SPECIAL_OPERATIONS: [&str; 4] = [":batch", ":alter", "/request", "/undelete"];

/// Collection paths whose GETs are list operations even with path parameters.
const COLLECTION_ENDPOINTS: [&str; 8] = [
    "/topics",
    "/clusters",
    "/subjects",
    "/schemas",
    "/connectors",
    "/consumers",
    "/partitions",
    "/configs",
];

/// Suffixes that point at one specific aspect of a resource.
const SPECIFIC_RESOURCE_ENDPOINTS: [&str; 3] = ["/offsets", "/status", "/versions"];

const CATALOG_BULK_TAGS_PATH: &str = "/catalog/v1/entity/tags";
const CATALOG_ENTITY_TAGS_PATH: &str = "/catalog/v1/entity/type/{typeName}/name/{qualifiedName}/tags";

/// Map an HTTP method and path template to a semantic action.
///
/// Returns `None` for methods outside {GET, POST, PUT, PATCH, DELETE}; such
/// operations get no registry entry.
#[must_use]
pub fn classify_action(method: &str, path: &str) -> Option<SemanticAction> {
    let method = method.to_ascii_uppercase();

    // Catalog bulk tag operations carry no path parameters.
    if path.contains(CATALOG_BULK_TAGS_PATH) && !path.contains("/{") {
        match method.as_str() {
            "POST" => return Some(SemanticAction::Create),
            "PUT" => return Some(SemanticAction::Update),
            _ => {}
        }
    }

    if path.contains(CATALOG_ENTITY_TAGS_PATH) {
        match method.as_str() {
            "GET" => {
                return Some(if path.contains("/{tagName}") {
                    SemanticAction::Get
                } else {
                    SemanticAction::List
                });
            }
            "DELETE" => return Some(SemanticAction::Delete),
            _ => {}
        }
    }

    match method.as_str() {
        "GET" => Some(classify_get(path)),
        "POST" => Some(classify_post(path)),
        "PUT" | "PATCH" => Some(SemanticAction::Update),
        "DELETE" => Some(SemanticAction::Delete),
        _ => None,
    }
}

fn classify_get(path: &str) -> SemanticAction {
    if !path.contains('{') {
        return SemanticAction::List;
    }

    if is_collection_endpoint(path) {
        return SemanticAction::List;
    }

    if SPECIFIC_RESOURCE_ENDPOINTS.iter().any(|e| path.contains(e)) {
        return SemanticAction::Get;
    }

    SemanticAction::Get
}

fn classify_post(path: &str) -> SemanticAction {
    if POST_SPECIAL_OPERATIONS.iter().any(|op| path.contains(op)) {
        return SemanticAction::Update;
    }
    SemanticAction::Create
}

fn is_collection_endpoint(path: &str) -> bool {
    COLLECTION_ENDPOINTS.iter().any(|endpoint| {
        let with_slash = format!("{endpoint}/");
        path == *endpoint
            || path == with_slash
            || path.ends_with(endpoint)
            || path.ends_with(&with_slash)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_instance_path_is_get() {
        assert_eq!(
            classify_action("GET", "/kafka/v3/clusters/{cluster_id}/topics/{topic_name}"),
            Some(SemanticAction::Get)
        );
    }

    #[test]
    fn get_on_collection_path_is_list() {
        assert_eq!(
            classify_action("GET", "/kafka/v3/clusters/{cluster_id}/topics"),
            Some(SemanticAction::List)
        );
        assert_eq!(
            classify_action("GET", "/iam/v2/environments"),
            Some(SemanticAction::List)
        );
    }

    #[test]
    fn get_on_specific_suffix_is_get() {
        assert_eq!(
            classify_action(
                "GET",
                "/kafka/v3/clusters/{cluster_id}/consumer-groups/{group_id}/offsets"
            ),
            Some(SemanticAction::Get)
        );
        assert_eq!(
            classify_action("GET", "/subjects/{subject}/versions"),
            Some(SemanticAction::Get)
        );
    }

    #[test]
    fn post_special_suffixes_are_updates() {
        assert_eq!(
            classify_action("POST", "/iam/v2/service-accounts:batch"),
            Some(SemanticAction::Update)
        );
        assert_eq!(
            classify_action("POST", "/kafka/v3/clusters/{cluster_id}/topics/{topic}:alter"),
            Some(SemanticAction::Update)
        );
        assert_eq!(
            classify_action("POST", "/srcm/v3/clusters/{id}/undelete"),
            Some(SemanticAction::Update)
        );
    }

    #[test]
    fn plain_post_is_create() {
        assert_eq!(
            classify_action("POST", "/kafka/v3/clusters/{cluster_id}/topics"),
            Some(SemanticAction::Create)
        );
    }

    #[test]
    fn put_patch_delete() {
        assert_eq!(
            classify_action("PUT", "/iam/v2/environments/{id}"),
            Some(SemanticAction::Update)
        );
        assert_eq!(
            classify_action("PATCH", "/iam/v2/environments/{id}"),
            Some(SemanticAction::Update)
        );
        assert_eq!(
            classify_action("DELETE", "/iam/v2/service-accounts/{id}"),
            Some(SemanticAction::Delete)
        );
    }

    #[test]
    fn unknown_method_is_unclassified() {
        assert_eq!(classify_action("OPTIONS", "/iam/v2/environments"), None);
        assert_eq!(classify_action("HEAD", "/iam/v2/environments"), None);
    }

    #[test]
    fn catalog_bulk_tag_operations() {
        assert_eq!(
            classify_action("POST", "/catalog/v1/entity/tags"),
            Some(SemanticAction::Create)
        );
        assert_eq!(
            classify_action("PUT", "/catalog/v1/entity/tags"),
            Some(SemanticAction::Update)
        );
    }

    #[test]
    fn catalog_entity_tag_operations() {
        let base = "/catalog/v1/entity/type/{typeName}/name/{qualifiedName}/tags";
        assert_eq!(classify_action("GET", base), Some(SemanticAction::List));
        assert_eq!(
            classify_action("GET", &format!("{base}/{{tagName}}")),
            Some(SemanticAction::Get)
        );
        assert_eq!(classify_action("DELETE", base), Some(SemanticAction::Delete));
    }
}
