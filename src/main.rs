use std::{path::PathBuf, process::ExitCode, sync::Arc};

use chain_exporter::{
    Error,
    chain::{self, rpc::RpcChain},
    shutdown::ShutdownManager,
    storage::{self, SqlStore},
    sync::{self, resync::resync_until},
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match Config::new(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_level.as_deref());

    match execute(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(fatal = e.is_fatal(), "exporter stopped: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: Config) -> Result<(), Error> {
    let shutdown = ShutdownManager::new();

    let store = SqlStore::connect(&config.storage).await?;
    let chain = Arc::new(RpcChain::new(&config.chain)?);

    info!(rpc = %config.chain.rpc_url, "using chain node");

    match command {
        Command::Run(_) => {
            sync::pipeline::run(config.sync, chain, store, shutdown.signalled()).await
        }
        Command::Resync(_) => {
            let cursor = resync_until(&chain, &store, shutdown.signalled()).await?;

            info!(?cursor, "resync finished");

            Ok(())
        }
    }
}

fn init_tracing(log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or(DEFAULT_LOG_LEVEL)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resync the mirror, then follow the chain until interrupted
    Run(Args),
    /// Resync the mirror and exit
    Resync(Args),
}

#[derive(Debug, clap::Args)]
pub struct Args {}

#[derive(Debug, Parser)]
#[clap(name = "chain-exporter")]
#[clap(bin_name = "chain-exporter")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    config: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub storage: storage::Config,
    pub chain: chain::Config,
    #[serde(default)]
    pub sync: sync::Config,
    pub log_level: Option<String>,
}

impl Config {
    pub fn new(config_path: &Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        s = s.add_source(config::File::with_name("exporter.toml").required(false));

        if let Some(explicit) = config_path.as_ref().and_then(|x| x.to_str()) {
            s = s.add_source(config::File::with_name(explicit).required(true));
        }

        s = s.add_source(
            config::Environment::with_prefix("EXPORTER")
                .prefix_separator("_")
                .separator("__"),
        );

        s.build()?.try_deserialize()
    }
}
