//! Ordered routing tables: base-URL selection, credential selection, the
//! path-pattern security-type fallback, and configuration-default resolution.
//!
//! Each table is an ordered list of (patterns, target) pairs; first match
//! wins. Extending a table never requires touching pipeline code.

use crate::config::Config;

/// Fixed control-plane URL for cloud endpoints.
pub const BASE_URL_CLOUD: &str = "https://api.confluent.cloud";
/// Fixed default URL for telemetry endpoints.
pub const BASE_URL_TELEMETRY: &str = "https://api.telemetry.confluent.cloud";

pub const SECURITY_TYPE_CLOUD: &str = "cloud-api-key";
pub const SECURITY_TYPE_RESOURCE: &str = "resource-api-key";
/// Legacy alias carried by some specs; treated as the cloud pair.
pub const SECURITY_TYPE_LEGACY: &str = "api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseUrlTarget {
    Telemetry,
    KafkaRest,
    FlinkRest,
    SchemaRegistry,
    Cloud,
}

const BASE_URL_RULES: [(&[&str], BaseUrlTarget); 5] = [
    (
        &["/v2/metrics/", "/v2/descriptors/", "/telemetry/"],
        BaseUrlTarget::Telemetry,
    ),
    (
        &["/kafka/", "/topics/", "/consumer-groups/", "/acls"],
        BaseUrlTarget::KafkaRest,
    ),
    (
        &["/flink/", "/compute-pools/", "/statements/"],
        BaseUrlTarget::FlinkRest,
    ),
    (
        &[
            "/schemas/",
            "/subjects/",
            "/mode",
            "/config",
            "/catalog/",
            "/exporters",
            "/contexts",
            "/dek-registry/",
        ],
        BaseUrlTarget::SchemaRegistry,
    ),
    (&["/tableflow/"], BaseUrlTarget::Cloud),
];

/// Select the upstream base URL for a lower-cased path; first match wins,
/// anything unmatched goes to the cloud control plane.
#[must_use]
pub fn base_url_for_path(cfg: &Config, path: &str) -> String {
    let path = path.to_ascii_lowercase();

    for (patterns, target) in BASE_URL_RULES {
        if !patterns.iter().any(|p| pattern_matches(p, &path)) {
            continue;
        }

        let url = match target {
            BaseUrlTarget::Telemetry => BASE_URL_TELEMETRY.to_string(),
            BaseUrlTarget::KafkaRest => cfg.kafka_rest_endpoint.clone(),
            BaseUrlTarget::FlinkRest => cfg.flink_rest_endpoint.clone(),
            BaseUrlTarget::SchemaRegistry => cfg.schema_registry_endpoint.clone(),
            BaseUrlTarget::Cloud => BASE_URL_CLOUD.to_string(),
        };
        if !url.is_empty() {
            return url;
        }
    }

    BASE_URL_CLOUD.to_string()
}

/// A pattern with a trailing slash also matches the bare path, so `/topics/`
/// matches a path that is exactly `/topics`.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    path.contains(pattern)
        || (pattern.ends_with('/') && path == pattern.trim_end_matches('/'))
}

const CLOUD_PATH_PATTERNS: [&str; 7] = [
    "/org/", "/iam/", "/srcm/", "/fcpm/", "/tableflow/", "/billing/", "/partner/",
];

const RESOURCE_PATH_PATTERNS: [&str; 16] = [
    "/kafka/",
    "/topics/",
    "/consumer-groups/",
    "/acls",
    "/configs",
    "/flink/",
    "/compute-pools/",
    "/statements/",
    "/schemas/",
    "/subjects/",
    "/mode",
    "/config",
    "/catalog/",
    "/exporters",
    "/contexts",
    "/dek-registry/",
];

/// Path-pattern fallback used when the spec carries no security information.
/// Cloud patterns are checked first.
#[must_use]
pub fn security_type_from_path(path: &str) -> &'static str {
    let path = path.to_ascii_lowercase();

    if CLOUD_PATH_PATTERNS.iter().any(|p| path.contains(p)) {
        return SECURITY_TYPE_CLOUD;
    }
    if RESOURCE_PATH_PATTERNS.iter().any(|p| path.contains(p)) {
        return SECURITY_TYPE_RESOURCE;
    }

    SECURITY_TYPE_CLOUD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialFamily {
    Kafka,
    Flink,
    SchemaRegistry,
    Tableflow,
}

const CREDENTIAL_RULES: [(&[&str], CredentialFamily); 4] = [
    (
        &[
            "kafka",
            "/kafka/v3/",
            "/topics/",
            "/consumer-groups/",
            "/acls",
            "/configs",
        ],
        CredentialFamily::Kafka,
    ),
    (&["flink"], CredentialFamily::Flink),
    (
        &[
            "schema-registry",
            "schemaregistry",
            "/schemas/",
            "/subjects/",
            "/mode",
            "/config",
            "/exporters",
            "/contexts",
            "/dek-registry/",
            "/catalog/",
        ],
        CredentialFamily::SchemaRegistry,
    ),
    (&["tableflow"], CredentialFamily::Tableflow),
];

const TELEMETRY_PATH_PATTERNS: [&str; 3] = ["/v2/metrics/", "/v2/descriptors/", "/telemetry/"];

/// Select the credential pair for a security type and endpoint path.
///
/// Unknown security types resolve to the cloud pair. Telemetry paths always
/// use the cloud pair even under `resource-api-key`. Returns `None` when no
/// resource family matches, which the caller reports as a configuration
/// error.
#[must_use]
pub fn credentials_for(
    cfg: &Config,
    security_type: &str,
    endpoint: &str,
) -> Option<(String, String)> {
    match security_type {
        SECURITY_TYPE_CLOUD | SECURITY_TYPE_LEGACY => {
            Some((cfg.cloud_api_key.clone(), cfg.cloud_api_secret.clone()))
        }
        SECURITY_TYPE_RESOURCE => {
            let endpoint = endpoint.to_ascii_lowercase();

            if TELEMETRY_PATH_PATTERNS.iter().any(|p| endpoint.contains(p)) {
                return Some((cfg.cloud_api_key.clone(), cfg.cloud_api_secret.clone()));
            }

            for (patterns, family) in CREDENTIAL_RULES {
                if patterns.iter().any(|p| pattern_matches(p, &endpoint)) {
                    return Some(match family {
                        CredentialFamily::Kafka => {
                            (cfg.kafka_api_key.clone(), cfg.kafka_api_secret.clone())
                        }
                        CredentialFamily::Flink => {
                            (cfg.flink_api_key.clone(), cfg.flink_api_secret.clone())
                        }
                        CredentialFamily::SchemaRegistry => (
                            cfg.schema_registry_api_key.clone(),
                            cfg.schema_registry_api_secret.clone(),
                        ),
                        CredentialFamily::Tableflow => (
                            cfg.tableflow_api_key.clone(),
                            cfg.tableflow_api_secret.clone(),
                        ),
                    });
                }
            }

            None
        }
        _ => Some((cfg.cloud_api_key.clone(), cfg.cloud_api_secret.clone())),
    }
}

struct DefaultRule {
    param_patterns: &'static [&'static str],
    endpoint_patterns: &'static [&'static str],
    value: fn(&Config) -> &str,
}

const DEFAULT_RULES: [DefaultRule; 5] = [
    DefaultRule {
        param_patterns: &["environment", "environment_id"],
        endpoint_patterns: &["environment"],
        value: |cfg| &cfg.cloud_env_id,
    },
    DefaultRule {
        param_patterns: &["cluster_id", "kafka_cluster_id"],
        endpoint_patterns: &["kafka"],
        value: |cfg| &cfg.kafka_cluster_id,
    },
    DefaultRule {
        param_patterns: &["compute_pool_id", "pool_id"],
        endpoint_patterns: &["flink"],
        value: |cfg| &cfg.flink_compute_pool_id,
    },
    DefaultRule {
        param_patterns: &["organization_id", "org_id", "org"],
        endpoint_patterns: &["organization"],
        value: |cfg| &cfg.flink_org_id,
    },
    DefaultRule {
        param_patterns: &["schema_registry_endpoint"],
        endpoint_patterns: &["schema"],
        value: |cfg| &cfg.schema_registry_endpoint,
    },
];

/// Resolve a default value for a parameter from configuration.
///
/// Matching is case-insensitive and by substring; a parameter-name match
/// outranks an endpoint-pattern match, so both passes run in rule order.
#[must_use]
pub fn default_for_param(cfg: &Config, param: &str, endpoint: &str) -> Option<String> {
    let param = param.to_ascii_lowercase();
    let endpoint = endpoint.to_ascii_lowercase();

    for rule in &DEFAULT_RULES {
        let param_matches = rule
            .param_patterns
            .iter()
            .any(|p| param == *p || param.contains(p));
        if param_matches {
            let value = (rule.value)(cfg);
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    for rule in &DEFAULT_RULES {
        let endpoint_matches = rule.endpoint_patterns.iter().any(|p| endpoint.contains(p));
        if endpoint_matches {
            let value = (rule.value)(cfg);
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}
