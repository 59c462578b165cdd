//! streamgate entry point: load configuration and specs, build the registry
//! and guardrails, then serve MCP over the selected transports.

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use streamgate_guardrails::{CompositeGuardrails, LoopDetectionConfig};
use streamgate_openapi::registry::SemanticRegistry;
use streamgate_openapi::spec;
use streamgate_server::config::Config;
use streamgate_server::mcp::{self, Gateway};
use streamgate_server::monitoring::Metrics;
use streamgate_server::prompts::PromptManager;

const DEFAULT_SPEC_PATH: &str = "api-spec/cloud-openapi.json";
const DEFAULT_TELEMETRY_SPEC_PATH: &str = "api-spec/telemetry-openapi.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ServeMode {
    Stdio,
    Http,
    Both,
}

#[derive(Parser)]
#[command(
    name = "streamgate",
    version,
    about = "Semantic MCP server over cloud streaming-platform REST APIs"
)]
struct Cli {
    /// Path to an environment file (defaults to ./.env when present)
    #[arg(long)]
    env: Option<PathBuf>,

    /// Transports to serve
    #[arg(long, value_enum, default_value_t = ServeMode::Both)]
    mode: ServeMode,

    /// Streamable HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.env.as_deref()).context("failed to load configuration")?;
    init_tracing(config.log.as_deref());

    let client = reqwest::Client::new();
    let main_source = config
        .openapi_spec_url
        .clone()
        .unwrap_or_else(|| DEFAULT_SPEC_PATH.to_string());
    let telemetry_source = config
        .telemetry_openapi_spec_url
        .clone()
        .unwrap_or_else(|| DEFAULT_TELEMETRY_SPEC_PATH.to_string());

    let main_spec = spec::load_spec(&client, &main_source)
        .await
        .context("failed to load main OpenAPI spec")?;
    let telemetry_spec = spec::load_spec(&client, &telemetry_source)
        .await
        .context("failed to load telemetry OpenAPI spec")?;

    let registry = Arc::new(SemanticRegistry::new());
    registry.load_main_spec(&main_spec);
    registry.load_telemetry_spec(&telemetry_spec);
    let tools = registry.generate_tools();
    tracing::info!(tools = tools.len(), "semantic tools generated");

    let guardrails = Arc::new(CompositeGuardrails::new(
        config.llm_detection.clone(),
        LoopDetectionConfig::from_env(),
    ));

    let mut prompts = PromptManager::new(
        config.prompts_folder.as_deref(),
        config.directives_folder.as_deref(),
    );
    if let Err(e) = prompts.load() {
        tracing::warn!("failed to load prompts: {e}");
    }

    let gateway = Gateway::new(
        Arc::new(config),
        Arc::new(main_spec),
        Arc::new(telemetry_spec),
        registry,
        tools,
        guardrails,
        Arc::new(prompts),
        Arc::new(Metrics::new()),
    );

    match cli.mode {
        ServeMode::Stdio => mcp::serve_stdio(gateway).await,
        ServeMode::Http => mcp::serve_http(gateway, &cli.addr).await,
        ServeMode::Both => {
            // Neither ingress blocks the other; HTTP owns the foreground and
            // handles shutdown signals.
            let stdio = tokio::spawn(mcp::serve_stdio(gateway.clone()));
            let result = mcp::serve_http(gateway, &cli.addr).await;
            stdio.abort();
            result
        }
    }
}

fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    // stdout carries the MCP stdio framing; diagnostics go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
