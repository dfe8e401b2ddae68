//! wdr-engine - Work Description Reconciler CLI
//!
//! Reconciles one work title end to end against the configured backends and
//! prints the final record as JSON. Configuration resolves from CLI
//! arguments, `WDR_*` environment variables, and `~/.config/wdr/wdr.toml`,
//! in that priority order.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wdr_common::config::{load_toml_config, resolve_setting};
use wdr_engine::backends::{HttpBackend, HttpBackendConfig};
use wdr_engine::{Arbiter, EngineConfig, Producer, Reconciler, WorkflowRequest};

#[derive(Parser, Debug)]
#[command(name = "wdr-engine", about = "Reconcile descriptions of a published work")]
struct Args {
    /// Work title to reconcile
    title: String,

    /// Internal tracking index
    #[arg(long, default_value = "0")]
    index: String,

    /// Known author names (repeatable)
    #[arg(long = "author")]
    authors: Vec<String>,

    /// Chat-completion endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// API key for the backend service
    #[arg(long, env = "WDR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Config file path (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    info!("Starting wdr-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let toml_config = load_toml_config(args.config.as_deref()).context("loading config file")?;
    let engine_config = EngineConfig::from_toml(&toml_config);
    engine_config.validate().context("validating configuration")?;

    let endpoint = resolve_setting(
        "endpoint",
        args.endpoint.as_deref(),
        "WDR_ENDPOINT",
        toml_config.endpoint.as_deref(),
    )
    .context("no backend endpoint configured")?;

    let api_key = resolve_setting(
        "api key",
        args.api_key.as_deref(),
        "WDR_API_KEY",
        toml_config.api_key.as_deref(),
    );

    info!("Endpoint: {}", endpoint);
    info!(
        "Producers: {} ({} attempts)",
        engine_config.generator_ids.len(),
        engine_config.attempt_count
    );

    let producers: Vec<Arc<dyn Producer>> = engine_config
        .generator_ids
        .iter()
        .map(|model_id| {
            let mut backend_config = HttpBackendConfig::new(endpoint.clone(), model_id.clone());
            backend_config.api_key = api_key.clone();
            backend_config.timeout = engine_config.call_timeout;
            HttpBackend::new(backend_config)
                .map(|backend| Arc::new(backend) as Arc<dyn Producer>)
        })
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("building producer backend: {}", e))?;

    let mut arbiter_config =
        HttpBackendConfig::new(endpoint.clone(), engine_config.arbiter_id.clone());
    arbiter_config.api_key = api_key.clone();
    arbiter_config.timeout = engine_config.call_timeout;
    let arbiter: Arc<dyn Arbiter> = Arc::new(
        HttpBackend::new(arbiter_config)
            .map_err(|e| anyhow::anyhow!("building arbiter backend: {}", e))?,
    );

    let reconciler = Reconciler::new(engine_config, producers, arbiter)?;

    let request = WorkflowRequest {
        title: args.title,
        index: args.index,
        known_authors: args.authors,
    };

    let record = reconciler
        .reconcile(&request, &CancellationToken::new())
        .await?;

    info!(
        "Workflow finished: {} via {} | tokens {} -> {}",
        record.status.as_str(),
        record.decision.as_str(),
        record.tokens_in,
        record.tokens_out
    );

    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}
