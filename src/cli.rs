// src/cli.rs
// CLI surface (A1, SPEC_FULL §6): `ckb serve`, `ckb config show`, `ckb config validate`.

use crate::config::EnvConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::{EngineMultiplexer, FileRepoRegistry, NullEngineFactory, SingleRepoRegistry};
use crate::handlers::build_registry;
use crate::metrics::WideResultMetrics;
use crate::protocol::{FramedReader, FramedWriter, Outbound};
use crate::registry::PresetState;
use crate::roots::RootsManager;
use crate::session::Session;
use crate::stream::StreamController;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "ckb")]
#[command(about = "MCP server exposing a code-knowledge-base query engine over JSON-RPC")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server over stdio (default)
    Serve {
        /// Override CKB_PRESET for this run
        #[arg(long)]
        preset: Option<String>,

        /// Override CKB_FEDERATION_REGISTRY for this run
        #[arg(long)]
        multi_repo_registry: Option<PathBuf>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved session configuration as JSON
    Show,
    /// Validate configuration, exiting non-zero on any problem
    Validate,
}

/// Run `ckb serve`: wire every subsystem together and drive the session
/// loop over stdio until the client disconnects (spec §4.11, §6.1).
pub async fn run_serve(preset_override: Option<String>, registry_path_override: Option<PathBuf>) -> Result<()> {
    let mut config = EnvConfig::load();
    if let Some(preset) = preset_override.as_deref() {
        config.preset = preset
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown preset '{preset}'"))?;
    }
    if let Some(path) = registry_path_override {
        config.multi_repo_registry_path = Some(path);
    }

    let validation = config.validate();
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }

    let config = Arc::new(config);

    let repo_registry: Arc<dyn crate::engine::RepoRegistry> = match &config.multi_repo_registry_path {
        Some(path) => Arc::new(FileRepoRegistry::load(path)?),
        None => Arc::new(SingleRepoRegistry::new(
            "self",
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        )),
    };

    let engine = Arc::new(EngineMultiplexer::new(
        repo_registry,
        Arc::new(NullEngineFactory),
        config.max_engines,
    ));
    // Single-repo mode activates immediately; multi-repo mode waits for
    // an explicit switchRepo call.
    if config.multi_repo_registry_path.is_none() {
        engine.switch_repo("self").await?;
    }

    let preset_state = Arc::new(PresetState::new(config.preset));
    let metrics = Arc::new(WideResultMetrics::default());
    let outbound: Arc<dyn Outbound> = Arc::new(FramedWriter::new(tokio::io::stdout()));
    let stream = Arc::new(StreamController::new(
        outbound.clone(),
        config.stream_max_buffer,
        Duration::from_secs(config.stream_heartbeat_secs),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        build_registry(),
        metrics.clone(),
        stream,
        config.stream_chunk_size,
    ));
    let roots = Arc::new(RootsManager::new(Duration::from_secs(config.roots_request_timeout_secs)));

    let session = Session::new(dispatcher, preset_state, engine, metrics, config.clone(), outbound, roots);

    info!(preset = %config.preset, "ckb server starting");
    let reader = FramedReader::new(tokio::io::stdin(), config.max_message_size);
    session.run(reader).await;
    info!("ckb server stopped");

    Ok(())
}

pub fn run_config_show() -> Result<()> {
    let config = EnvConfig::load();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn run_config_validate() -> Result<()> {
    let config = EnvConfig::load();
    let validation = config.validate();
    if validation.is_clean() {
        println!("configuration OK");
        Ok(())
    } else {
        for warning in &validation.warnings {
            eprintln!("- {warning}");
        }
        bail!("{} configuration warning(s)", validation.warnings.len());
    }
}
