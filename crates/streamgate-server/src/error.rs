//! Error types for the server crate.

use streamgate_openapi::error::RegistryError;
use thiserror::Error;

/// Errors surfaced at the tool-invocation boundary.
///
/// Every variant's `Display` becomes the `error` string of the MCP response;
/// no upstream HTTP details are lost in translation.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Tool not found")]
    ToolNotFound,

    /// Blocked by guardrails; the reason is the human-readable message from
    /// the blocking validator. No upstream call was made.
    #[error("{0}")]
    Blocked(String),

    #[error("Endpoint mapping error: {0}")]
    Mapping(RegistryError),

    #[error("Telemetry resource error: {0}")]
    Telemetry(RegistryError),

    #[error("missing API credentials for security type: {0}")]
    MissingCredentials(String),

    #[error("could not determine base URL for path: {0}")]
    BaseUrl(String),

    #[error("failed to marshal request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("failed to execute request: {0}")]
    Transport(String),

    #[error("API request failed with status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Invalid or unsupported tool invocation")]
    Unsupported,
}
