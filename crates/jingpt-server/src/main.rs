//! JinGPT server
//!
//! HTTP service that answers questions about portfolio companies by letting
//! an LLM search and read SharePoint and Confluence documents.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{error, info, warn};

use jingpt_client::AnthropicClient;
use jingpt_server::config::DEFAULT_CONFIG_PATH;
use jingpt_server::{AppState, Result, Server, ServerConfig, ServerError};

#[derive(Debug, Parser)]
#[command(name = "jingpt-server", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "JINGPT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Initializes structured logging with tracing.
///
/// Supports two output formats via `JINGPT_LOG_FORMAT` environment variable:
/// - `json`: Machine-readable JSON logs (for production)
/// - `pretty`: Human-readable formatted logs (default)
///
/// Log level is controlled via `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("JINGPT_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("jingpt_server=info,jingpt=info,jingpt_tools=info,tower_http=info")
    });

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

/// Resolves when SIGTERM or SIGINT arrives.
async fn shutdown_signal(mut signals: Signals) {
    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM => {
                info!("Received SIGTERM, initiating graceful shutdown");
                return;
            }
            SIGINT => {
                info!("Received SIGINT, initiating graceful shutdown");
                return;
            }
            _ => {}
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    info!("Starting JinGPT server");

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            error!("Expected config at: {}", args.config.display());
            return Err(e);
        }
    };

    let client_config = config.client_config(env_var)?;
    let llm = AnthropicClient::new(client_config)
        .map_err(|e| ServerError::Config(format!("Failed to create LLM client: {e:#}")))?;
    info!(
        provider = %config.model.provider,
        model = %config.model.model,
        max_rounds = config.orchestration.max_rounds,
        "LLM client ready"
    );

    let http = reqwest::Client::builder()
        .user_agent(concat!("jingpt/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ServerError::Config(format!("Failed to create HTTP client: {e}")))?;

    let atlassian = config.atlassian_app(env_var);
    let mut state = AppState::new(config, Arc::new(llm), http);
    if let Some(app) = atlassian {
        info!("Atlassian login enabled");
        state = state.with_atlassian(app);
    } else {
        warn!("Atlassian client credentials not set, Confluence login disabled");
    }

    let signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();

    Server::new(state).run(shutdown_signal(signals)).await?;

    handle.close();
    info!("Server shutdown complete");

    Ok(())
}
