mod commands;
mod config;
mod engine;
mod error;
mod prelude;
mod provider;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::CancelHandle;

/// tablesync - Converge a partitioned key-value table towards its declaration
#[derive(Debug, Parser)]
#[command(name = "tablesync")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: Global,

    #[command(subcommand)]
    command: commands::Commands,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Silence the command output
    #[clap(long, global = true)]
    pub silent: bool,

    /// Enable verbose output
    #[clap(long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[clap(long, global = true, env = "TABLESYNC_LOG_JSON")]
    pub log_json: bool,
}

impl Global {
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    fn default_filter(&self) -> &'static str {
        if self.verbose {
            "tablesync=debug"
        } else if self.silent {
            "tablesync=warn"
        } else {
            "tablesync=info"
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.global.default_filter().into());
    let logs = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if cli.global.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(logs.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(logs)
            .init();
    }

    let cancel = CancelHandle::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current unit");
                cancel.cancel();
            }
        }
    });

    commands::run(cli.command, &cli.global, cancel).await
}
