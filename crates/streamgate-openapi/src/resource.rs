//! Resource-name extraction from path templates.
//!
//! A path yields at most one resource name. Candidates are segments that look
//! like plural nouns; version segments (`v1`, `v3`, ...) and `{param}`
//! segments never qualify. When several candidates remain the last one wins,
//! which favors the most specific sub-resource in nested paths.

const MIN_PATH_PART_LEN: usize = 2;
const MIN_RESOURCE_NAME_LEN: usize = 3;
const MIN_HYPHENATED_RESOURCE_LEN: usize = 4;
const MAX_VERSION_LEN: usize = 3;

/// Common plural endings seen in REST resource names.
const COMMON_PLURAL_ENDINGS: [&str; 7] = ["ies", "es", "ings", "ers", "ors", "ants", "ents"];

/// `configs` is always a sub-resource, never a resource of its own.
const EXCLUDED_RESOURCES: [&str; 1] = ["configs"];

/// Extract the primary resource name from an API path template.
///
/// Returns `None` when no segment qualifies, in which case the path is
/// skipped by the registry.
#[must_use]
pub fn resource_from_path(path: &str) -> Option<String> {
    let parts: Vec<&str> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();

    let candidates: Vec<&str> = parts
        .iter()
        .copied()
        .filter(|p| {
            !is_path_parameter(p)
                && !is_version_segment(p)
                && !is_excluded(p)
                && is_plural_resource_name(p)
        })
        .collect();

    if let Some(last) = candidates.last() {
        return Some((*last).to_ascii_lowercase());
    }

    // No plural candidate: fall back to the rightmost segment that is neither
    // a parameter nor a version marker.
    parts
        .iter()
        .rev()
        .find(|p| !is_path_parameter(p) && !is_version_segment(p) && !is_excluded(p))
        .map(|p| p.to_ascii_lowercase())
}

fn is_excluded(part: &str) -> bool {
    EXCLUDED_RESOURCES.contains(&part)
}

/// `{name}` path parameters are never resources.
fn is_path_parameter(part: &str) -> bool {
    part.starts_with('{') && part.ends_with('}')
}

/// Version markers like `v1`, `v2`, `v3`.
fn is_version_segment(part: &str) -> bool {
    part.starts_with('v') && part.len() <= MAX_VERSION_LEN
}

fn is_plural_resource_name(part: &str) -> bool {
    if part.len() <= MIN_PATH_PART_LEN {
        return false;
    }

    if has_common_plural_ending(part) {
        return true;
    }

    // Hyphenated resources like "broker-configs" or "compute-pools" qualify
    // when the trailing component is plural.
    if part.contains('-') && part.len() > MIN_HYPHENATED_RESOURCE_LEN {
        let last = part.rsplit('-').next().unwrap_or("");
        return last.ends_with('s') && last.len() > MIN_PATH_PART_LEN;
    }

    part.ends_with('s') && part.len() > MIN_RESOURCE_NAME_LEN
}

fn has_common_plural_ending(part: &str) -> bool {
    COMMON_PLURAL_ENDINGS
        .iter()
        .any(|ending| part.ends_with(ending) && part.len() > ending.len() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_kafka_path_yields_last_resource() {
        assert_eq!(
            resource_from_path("/kafka/v3/clusters/{cluster_id}/topics/{topic_name}/configs"),
            Some("topics".to_string())
        );
    }

    #[test]
    fn hyphenated_resource_is_kept_whole() {
        assert_eq!(
            resource_from_path("/kafka/v3/clusters/{cluster_id}/broker-configs/{name}"),
            Some("broker-configs".to_string())
        );
    }

    #[test]
    fn configs_is_never_a_standalone_resource() {
        assert_eq!(
            resource_from_path("/kafka/v3/clusters/{cluster_id}/topics/{topic_name}/configs"),
            Some("topics".to_string())
        );
        // Even when nothing else qualifies, configs does not win.
        assert_eq!(resource_from_path("/v1/configs"), None);
    }

    #[test]
    fn version_segments_are_skipped() {
        assert_eq!(
            resource_from_path("/iam/v2/environments"),
            Some("environments".to_string())
        );
        assert_eq!(
            resource_from_path("/srcm/v3/clusters"),
            Some("clusters".to_string())
        );
    }

    #[test]
    fn fallback_picks_rightmost_plain_segment() {
        assert_eq!(resource_from_path("/mode"), Some("mode".to_string()));
        assert_eq!(
            resource_from_path("/config/{subject}"),
            Some("config".to_string())
        );
    }

    #[test]
    fn empty_and_parameter_only_paths_yield_none() {
        assert_eq!(resource_from_path("/"), None);
        assert_eq!(resource_from_path("/{id}"), None);
        assert_eq!(resource_from_path("/v1/{id}"), None);
    }

    #[test]
    fn emitted_names_contain_no_braces() {
        for path in [
            "/kafka/v3/clusters/{cluster_id}/topics",
            "/catalog/v1/entity/type/{typeName}/name/{qualifiedName}/tags",
            "/iam/v2/service-accounts/{id}",
        ] {
            let name = resource_from_path(path).unwrap();
            assert!(!name.contains('{'), "unexpected brace in {name}");
        }
    }

    #[test]
    fn common_plural_endings_qualify() {
        assert_eq!(
            resource_from_path("/fcpm/v2/compute-pools"),
            Some("compute-pools".to_string())
        );
        assert_eq!(
            resource_from_path("/connect/v1/connectors"),
            Some("connectors".to_string())
        );
        assert_eq!(
            resource_from_path("/iam/v2/identity-providers"),
            Some("identity-providers".to_string())
        );
    }
}
