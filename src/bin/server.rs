//! Hub server binary

use clap::{Parser, Subcommand};
use hubkv::common::{parse_duration, Config};
use hubkv::HubServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hubkv-server")]
#[command(about = "hubkv replicated coordination hub")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub server
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// Reconciliation interval (e.g. "500ms", "5s")
        #[arg(long)]
        sync_interval: Option<String>,

        /// Per-subscriber event buffer size
        #[arg(long)]
        event_buffer: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            sync_interval,
            event_buffer,
        } => {
            // File/env config first, CLI flags take priority
            let mut config = Config::load().hub;
            if let Some(bind) = bind {
                config.bind_addr = bind.parse()?;
            }
            if let Some(interval) = sync_interval {
                config.sync_interval_ms = parse_duration(&interval)?.as_millis() as u64;
            }
            if let Some(buffer) = event_buffer {
                config.event_buffer = buffer;
            }

            let server = HubServer::new(config);
            server.serve().await?;
        }
    }

    Ok(())
}
