//! Environment configuration.
//!
//! All credentials and endpoints come from environment variables (optionally
//! seeded from a `.env` file). Required variables are validated at startup;
//! a missing variable, a malformed ID prefix or an invalid URL fails fast
//! with a descriptive message. The loaded configuration is immutable.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use streamgate_guardrails::LlmDetectionConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {0:?}")]
    MissingVars(Vec<String>),

    #[error("{0}")]
    Invalid(String),
}

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub openapi_spec_url: Option<String>,
    pub telemetry_openapi_spec_url: Option<String>,

    pub cloud_env_id: String,
    pub cloud_api_key: String,
    pub cloud_api_secret: String,
    pub bootstrap_servers: String,

    pub kafka_api_key: String,
    pub kafka_api_secret: String,
    pub kafka_rest_endpoint: String,
    pub kafka_cluster_id: String,

    pub flink_org_id: String,
    pub flink_rest_endpoint: String,
    pub flink_env_name: String,
    pub flink_database_name: String,
    pub flink_api_key: String,
    pub flink_api_secret: String,
    pub flink_compute_pool_id: String,

    pub schema_registry_api_key: String,
    pub schema_registry_api_secret: String,
    pub schema_registry_endpoint: String,

    pub tableflow_api_key: String,
    pub tableflow_api_secret: String,

    pub log: Option<String>,
    pub prompts_folder: Option<String>,
    pub directives_folder: Option<String>,
    pub disable_resource_discovery: bool,

    pub llm_detection: LlmDetectionConfig,
}

const REQUIRED_VARS: [&str; 20] = [
    "CLOUD_ENV_ID",
    "CLOUD_API_KEY",
    "CLOUD_API_SECRET",
    "BOOTSTRAP_SERVERS",
    "KAFKA_API_KEY",
    "KAFKA_API_SECRET",
    "KAFKA_REST_ENDPOINT",
    "KAFKA_CLUSTER_ID",
    "FLINK_ORG_ID",
    "FLINK_REST_ENDPOINT",
    "FLINK_ENV_NAME",
    "FLINK_DATABASE_NAME",
    "FLINK_API_KEY",
    "FLINK_API_SECRET",
    "FLINK_COMPUTE_POOL_ID",
    "SCHEMA_REGISTRY_API_KEY",
    "SCHEMA_REGISTRY_API_SECRET",
    "SCHEMA_REGISTRY_ENDPOINT",
    "TABLEFLOW_API_KEY",
    "TABLEFLOW_API_SECRET",
];

impl Config {
    /// Load configuration from the process environment, optionally seeding it
    /// from a `.env` file first.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or fails content
    /// validation.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        match env_file {
            Some(path) => {
                let _ = dotenvy::from_filename(path);
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }

        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build and validate a configuration from an explicit variable map.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::load`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| vars.get(key).cloned().unwrap_or_default();
        let get_opt = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let mut missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|key| get(key).is_empty())
            .map(|key| (*key).to_string())
            .collect();
        missing.sort();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }

        let cfg = Self {
            openapi_spec_url: get_opt("OPENAPI_SPEC_URL"),
            telemetry_openapi_spec_url: get_opt("TELEMETRY_OPENAPI_SPEC_URL"),

            cloud_env_id: get("CLOUD_ENV_ID"),
            cloud_api_key: get("CLOUD_API_KEY"),
            cloud_api_secret: get("CLOUD_API_SECRET"),
            bootstrap_servers: get("BOOTSTRAP_SERVERS"),

            kafka_api_key: get("KAFKA_API_KEY"),
            kafka_api_secret: get("KAFKA_API_SECRET"),
            kafka_rest_endpoint: get("KAFKA_REST_ENDPOINT"),
            kafka_cluster_id: get("KAFKA_CLUSTER_ID"),

            flink_org_id: get("FLINK_ORG_ID"),
            flink_rest_endpoint: get("FLINK_REST_ENDPOINT"),
            flink_env_name: get("FLINK_ENV_NAME"),
            flink_database_name: get("FLINK_DATABASE_NAME"),
            flink_api_key: get("FLINK_API_KEY"),
            flink_api_secret: get("FLINK_API_SECRET"),
            flink_compute_pool_id: get("FLINK_COMPUTE_POOL_ID"),

            schema_registry_api_key: get("SCHEMA_REGISTRY_API_KEY"),
            schema_registry_api_secret: get("SCHEMA_REGISTRY_API_SECRET"),
            schema_registry_endpoint: get("SCHEMA_REGISTRY_ENDPOINT"),

            tableflow_api_key: get("TABLEFLOW_API_KEY"),
            tableflow_api_secret: get("TABLEFLOW_API_SECRET"),

            log: get_opt("LOG"),
            prompts_folder: get_opt("PROMPTS_FOLDER"),
            directives_folder: get_opt("DIRECTIVES_FOLDER"),
            disable_resource_discovery: var_bool(vars, "DISABLE_RESOURCE_DISCOVERY", false),

            llm_detection: LlmDetectionConfig {
                enabled: var_bool(vars, "LLM_DETECTION_ENABLED", false),
                url: get_opt("LLM_DETECTION_URL")
                    .unwrap_or_else(|| LlmDetectionConfig::default().url),
                model: get_opt("LLM_DETECTION_MODEL")
                    .unwrap_or_else(|| LlmDetectionConfig::default().model),
                timeout: Duration::from_secs(var_u64(vars, "LLM_DETECTION_TIMEOUT", 10)),
                api_key: get_opt("LLM_DETECTION_API_KEY"),
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.cloud_env_id.starts_with("env-") {
            return Err(ConfigError::Invalid(
                "CLOUD_ENV_ID must start with 'env-'".to_string(),
            ));
        }
        if !self.kafka_cluster_id.starts_with("lkc-") {
            return Err(ConfigError::Invalid(
                "KAFKA_CLUSTER_ID must start with 'lkc-'".to_string(),
            ));
        }
        if !self.flink_compute_pool_id.starts_with("lfcp-") {
            return Err(ConfigError::Invalid(
                "FLINK_COMPUTE_POOL_ID must start with 'lfcp-'".to_string(),
            ));
        }
        if url::Url::parse(&self.schema_registry_endpoint).is_err() {
            return Err(ConfigError::Invalid(
                "SCHEMA_REGISTRY_ENDPOINT must be a valid URL".to_string(),
            ));
        }
        Ok(())
    }
}

fn var_bool(vars: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match vars.get(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}

fn var_u64(vars: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    vars.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
