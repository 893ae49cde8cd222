// src/main.rs
// CKB — MCP server exposing a code-knowledge-base query engine

use anyhow::Result;
use ckb::cli::{run_config_show, run_config_validate, run_serve, Cli, Commands, ConfigAction};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load a local .env if present; never required, never overrides already-set vars.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // stdout is the JSON-RPC transport when serving — logs must never land
    // there. Level is quiet by default so an unconfigured `CKB_LOG` doesn't
    // interleave noise with a human reading `ckb config show`.
    let level = match std::env::var("CKB_LOG").ok().as_deref() {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | None => Level::WARN,
        Some("error") => Level::ERROR,
        Some(other) => {
            eprintln!("[ckb] unknown CKB_LOG={other:?}, using warn");
            Level::WARN
        }
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None => run_serve(None, None).await?,
        Some(Commands::Serve { preset, multi_repo_registry }) => {
            run_serve(preset, multi_repo_registry).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => run_config_show()?,
            ConfigAction::Validate => run_config_validate()?,
        },
    }

    Ok(())
}
