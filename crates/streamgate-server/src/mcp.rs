//! The MCP surface: tool, prompt and resource capabilities served over stdio
//! and streamable HTTP (`/mcp`).
//!
//! Tool invocations always come back as a text content payload: either the
//! JSON-encoded result or an `Error: ...` string. Exactly one of the two is
//! produced per call.

use crate::config::Config;
use crate::monitoring::Metrics;
use crate::prompts::PromptManager;
use openapiv3::OpenAPI;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, GetPromptRequestParam, GetPromptResult,
    Implementation, JsonObject, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, Prompt, PromptMessage, PromptMessageRole, ProtocolVersion,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use streamgate_guardrails::CompositeGuardrails;
use streamgate_openapi::registry::{SemanticRegistry, ToolSpec};

pub const SERVER_NAME: &str = "streamgate";

const PROMPTS_TOOL: &str = "prompts";
const GET_PROMPT_TOOL: &str = "get_prompt";

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-scoped state shared by every transport and invocation.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) config: Arc<Config>,
    pub(crate) registry: Arc<SemanticRegistry>,
    pub(crate) spec: Arc<OpenAPI>,
    pub(crate) telemetry_spec: Arc<OpenAPI>,
    pub(crate) tools: Arc<Vec<ToolSpec>>,
    pub(crate) guardrails: Arc<CompositeGuardrails>,
    pub(crate) prompts: Arc<PromptManager>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) http: reqwest::Client,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        spec: Arc<OpenAPI>,
        telemetry_spec: Arc<OpenAPI>,
        registry: Arc<SemanticRegistry>,
        tools: Vec<ToolSpec>,
        guardrails: Arc<CompositeGuardrails>,
        prompts: Arc<PromptManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            registry,
            spec,
            telemetry_spec,
            tools: Arc::new(tools),
            guardrails,
            prompts,
            metrics,
            http,
        }
    }

    fn mcp_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .tools
            .iter()
            .map(|t| {
                let schema = t.parameters.as_object().cloned().unwrap_or_default();
                Tool::new(t.name.clone(), t.description.clone(), Arc::new(schema))
            })
            .collect();

        tools.push(Tool::new(
            PROMPTS_TOOL.to_string(),
            "List all available prompts with their descriptions".to_string(),
            Arc::new(empty_object_schema()),
        ));
        tools.push(Tool::new(
            GET_PROMPT_TOOL.to_string(),
            "Get the content of a specific prompt by name".to_string(),
            Arc::new(get_prompt_schema()),
        ));

        tools
    }

    fn handle_prompts_tool(&self) -> CallToolResult {
        let prompts = self.prompts.list();
        let mut lines = vec![format!("Found {} available prompts:\n", prompts.len())];
        for prompt in prompts {
            lines.push(format!("- **{}**: {}", prompt.name, prompt.description));
        }
        CallToolResult::success(vec![Content::text(lines.join("\n"))])
    }

    fn handle_get_prompt_tool(&self, args: &JsonObject) -> CallToolResult {
        let Some(name) = args.get("name").and_then(Value::as_str) else {
            return CallToolResult::error(vec![Content::text(
                "Error: 'name' parameter is required and must be a string",
            )]);
        };

        let Some(prompt) = self.prompts.get(name) else {
            return CallToolResult::error(vec![Content::text(format!(
                "Error: Prompt '{name}' not found"
            ))]);
        };

        let text = format!(
            "**Prompt: {}**\n\n**Description:** {}\n\n**Content:**\n{}",
            prompt.name, prompt.description, prompt.content
        );
        CallToolResult::success(vec![Content::text(text)])
    }
}

fn empty_object_schema() -> JsonObject {
    serde_json::from_value(serde_json::json!({
        "type": "object",
        "properties": {},
    }))
    .unwrap_or_default()
}

fn get_prompt_schema() -> JsonObject {
    serde_json::from_value(serde_json::json!({
        "type": "object",
        "properties": {
            "name": {
                "type": "string",
                "description": "The name of the prompt to retrieve",
            },
        },
        "required": ["name"],
    }))
    .unwrap_or_default()
}

impl ServerHandler for Gateway {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::default()
            },
            instructions: Some(
                "Semantic tools over cloud streaming-platform REST APIs. Pick an action \
                 (create, list, get, update, delete, get_telemetry), a resource, and pass \
                 resource-specific arguments under 'parameters'."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.mcp_tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();

        match request.name.as_ref() {
            PROMPTS_TOOL => Ok(self.handle_prompts_tool()),
            GET_PROMPT_TOOL => Ok(self.handle_get_prompt_tool(&args)),
            name => match self.invoke_tool(name, args).await {
                Ok(result) => {
                    let text = serde_json::to_string(&result).unwrap_or_else(|_| result.to_string());
                    Ok(CallToolResult::success(vec![Content::text(text)]))
                }
                Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                    "Error: {e}"
                ))])),
            },
        }
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts = self
            .prompts
            .list()
            .into_iter()
            .map(|p| Prompt::new(p.name.clone(), Some(p.description.clone()), None))
            .collect();

        Ok(ListPromptsResult {
            prompts,
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let content = self
            .prompts
            .content_with_substitution(&request.name, &self.config)
            .ok_or_else(|| {
                McpError::invalid_params(format!("prompt '{}' not found", request.name), None)
            })?;

        Ok(GetPromptResult {
            description: Some(format!("Prompt: {}", request.name)),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, content)],
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        // Resource-instance discovery is an external collaborator; with it
        // absent or disabled the advertised list is empty.
        if self.config.disable_resource_discovery {
            tracing::debug!("resource discovery disabled");
        }
        Ok(ListResourcesResult {
            resources: Vec::new(),
            next_cursor: None,
        })
    }
}

/// Serve the MCP protocol over stdio until the client disconnects.
///
/// # Errors
///
/// Returns an error if the transport fails to initialize or tears down
/// abnormally.
pub async fn serve_stdio(gateway: Gateway) -> anyhow::Result<()> {
    tracing::info!("starting MCP stdio server");
    let service = gateway.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Serve the MCP protocol over streamable HTTP at `/mcp`, alongside the
/// health and metrics endpoints.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve_http(gateway: Gateway, addr: &str) -> anyhow::Result<()> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };

    let metrics = gateway.metrics.clone();
    let service = StreamableHttpService::new(
        move || Ok(gateway.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = crate::monitoring::router(metrics).nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "starting streamable HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
