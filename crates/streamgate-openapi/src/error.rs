//! Error types for `streamgate-openapi`.

use thiserror::Error;

/// Errors raised while loading or parsing an `OpenAPI` document.
#[derive(Error, Debug)]
pub enum OpenApiError {
    #[error("failed to fetch OpenAPI spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("failed to fetch OpenAPI spec: HTTP {status}")]
    SpecStatus { url: String, status: u16 },

    #[error("failed to read OpenAPI spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse OpenAPI spec from '{location}': {source}")]
    SpecParseJson {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse OpenAPI spec from '{location}': {source}")]
    SpecParseYaml {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised by semantic registry lookups.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("action '{0}' not supported")]
    UnsupportedAction(String),

    #[error("resource '{resource}' not supported for action '{action}'")]
    UnsupportedResource { action: String, resource: String },

    #[error("telemetry resource '{0}' not found")]
    UnknownTelemetryResource(String),
}

/// Result type alias for spec-loading operations.
pub type Result<T> = std::result::Result<T, OpenApiError>;
