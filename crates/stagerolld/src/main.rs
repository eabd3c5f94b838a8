//! stagerolld — the stageroll daemon.
//!
//! Opens the redb state store and serves the schedule REST API.
//!
//! # Usage
//!
//! ```text
//! stagerolld serve --config /etc/stageroll/stageroll.toml
//! stagerolld serve --in-memory --port 9000
//! stagerolld register-stage payments prod --data-dir /var/lib/stageroll
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use stageroll_core::{StageRef, StagerollConfig};
use stageroll_state::StateStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagerolld", about = "stageroll daemon")]
struct Cli {
    /// Path to stageroll.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the schedule API.
    Serve {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Keep all state in memory.
        #[arg(long)]
        in_memory: bool,
    },
    /// Register an environment stage so schedules can be bound to it.
    RegisterStage { env: String, stage: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Command::Serve { port, in_memory } = &cli.command {
        if let Some(port) = port {
            config.server.port = *port;
        }
        config.storage.in_memory |= *in_memory;
    }

    init_tracing(&config);

    match cli.command {
        Command::Serve { .. } => run_serve(config).await,
        Command::RegisterStage { env, stage } => register_stage(&config, &env, &stage),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StagerollConfig> {
    match path {
        Some(path) => StagerollConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(StagerollConfig::default()),
    }
}

fn init_tracing(config: &StagerollConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(config: &StagerollConfig) -> anyhow::Result<StateStore> {
    if config.storage.in_memory {
        warn!("using in-memory state store; schedules will not survive a restart");
        return Ok(StateStore::open_in_memory()?);
    }
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.database_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run_serve(config: StagerollConfig) -> anyhow::Result<()> {
    info!("stageroll daemon starting");

    let store = open_store(&config)?;
    let router = stageroll_api::build_router(store);

    let ip = config
        .server
        .bind
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("stageroll daemon stopped");
    Ok(())
}

fn register_stage(config: &StagerollConfig, env: &str, stage: &str) -> anyhow::Result<()> {
    let stage = StageRef::parse(env, stage)?;
    let store = open_store(config)?;
    let binding = store.register_stage(&stage)?;
    match binding.schedule_id {
        Some(id) => info!(%stage, schedule = %id, "stage already registered"),
        None => info!(%stage, "stage registered"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve_overrides() {
        let cli = Cli::parse_from(["stagerolld", "serve", "--port", "9000", "--in-memory"]);
        match cli.command {
            Command::Serve { port, in_memory } => {
                assert_eq!(port, Some(9000));
                assert!(in_memory);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn cli_parses_register_stage() {
        let cli = Cli::parse_from([
            "stagerolld",
            "register-stage",
            "payments",
            "prod",
            "--data-dir",
            "/tmp/sr",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/sr")));
        match cli.command {
            Command::RegisterStage { env, stage } => {
                assert_eq!(env, "payments");
                assert_eq!(stage, "prod");
            }
            _ => panic!("expected register-stage"),
        }
    }

    #[test]
    fn missing_config_path_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.server.port, 8443);
    }

    #[test]
    fn register_stage_persists_to_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StagerollConfig::default();
        config.storage.data_dir = dir.path().join("state");

        register_stage(&config, "payments", "prod").unwrap();
        // Registering twice keeps a single record.
        register_stage(&config, "payments", "prod").unwrap();

        let store = StateStore::open(&config.database_path()).unwrap();
        assert_eq!(store.list_bindings().unwrap().len(), 1);
    }

    #[test]
    fn register_stage_rejects_bad_names() {
        let mut config = StagerollConfig::default();
        config.storage.in_memory = true;
        assert!(register_stage(&config, "pay ments", "prod").is_err());
    }
}
