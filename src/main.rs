#![forbid(unsafe_code)]

//! `relay-recorder` — operator tool for the recording port pool.
//!
//! The recording coordinator itself is embedded as a library by the
//! signaling service; this binary covers the durable-store operations an
//! operator needs directly: provisioning the pool, inspecting it, and
//! recovering ports from dead sessions.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use relay_recorder::config::GlobalConfig;
use relay_recorder::persistence::{db, port_repo::PortRepo};
use relay_recorder::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "relay-recorder", about = "Recording port pool operator tool", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision the port pool from the configured range (idempotent).
    Seed,
    /// Report free and claimed slot counts.
    Status,
    /// Release every port held by a session (idempotent).
    Release {
        /// The owning recording session.
        session_id: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    let db = Arc::new(db::connect(&config.db_path).await?);
    let ports = PortRepo::new(db);

    match args.command {
        Command::Seed => {
            ports
                .seed(config.recording.port_range_min, config.recording.port_range_max)
                .await?;
            info!(
                min = config.recording.port_range_min,
                max = config.recording.port_range_max,
                "port pool seeded"
            );
        }
        Command::Status => {
            let free = ports.count_free().await?;
            let total = ports.count_total().await?;
            info!(free, claimed = total - free, total, "port pool status");
            for slot in ports.list_slots().await? {
                if let (Some(kind), Some(session_id)) = (slot.kind, slot.session_id.as_deref()) {
                    info!(port = slot.value, %kind, session_id, "claimed");
                }
            }
        }
        Command::Release { session_id } => {
            let freed = ports.release(&session_id).await?;
            info!(session_id, freed, "ports released");
        }
    }

    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
