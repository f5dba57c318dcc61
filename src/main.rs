use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use oai_rt_phone::server::{self, AppState};
use oai_rt_phone::tasks::{InMemoryTaskStore, JsonFileTaskStore, TaskStore, TaskTools};
use oai_rt_phone::transport::rest::CallsClient;
use oai_rt_phone::{
    BridgeConfig, CallBridge, CallLogSink, JsonlCallLogSink, ToolRegistry, TracingCallLogSink, prompt,
};

/// Answer inbound SIP calls with an OpenAI Realtime voice agent.
#[derive(Parser, Debug)]
#[command(name = "oai-rt-phone")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML file whose keys override environment settings
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overriding BIND_ADDR
    #[arg(short = 'b', long = "bind", value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            BridgeConfig::from_file(path)?
        }
        None => BridgeConfig::from_env()?,
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    tracing::debug!(?config, "Configuration loaded");

    let instructions =
        prompt::build_system_prompt(&config.system_prompt_path, &config.faq_path).await;

    let tasks: Arc<dyn TaskStore> = match &config.tasks_path {
        Some(path) => Arc::new(
            JsonFileTaskStore::open(path)
                .await
                .with_context(|| format!("opening task store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryTaskStore::new()),
    };
    let mut tools = ToolRegistry::new();
    TaskTools::new(tasks, config.client_id.clone()).register(&mut tools);

    let call_log: Arc<dyn CallLogSink> = match &config.call_log_path {
        Some(path) => Arc::new(
            JsonlCallLogSink::open(path)
                .await
                .with_context(|| format!("opening call log {}", path.display()))?,
        ),
        None => Arc::new(TracingCallLogSink),
    };

    let bridge = CallBridge::builder()
        .api_key(config.api_key.clone())
        .tools(tools)
        .call_log(call_log)
        .transcription(
            config.transcription_model.clone(),
            config.transcription_language.clone(),
        )
        .build()?;

    let state = Arc::new(AppState {
        acceptor: Arc::new(CallsClient::new(&config.api_key)?),
        bridge,
        accept_session: prompt::accept_config(&config.model, &instructions),
        greeting: config.greeting.clone(),
        default_phone_number: config.default_phone_number.clone(),
    });

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Listening for call webhooks");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
    }
    tracing::info!("Shutting down");
}
