use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wotgate::config::CONFIG_PATH_ENV;
use wotgate::{Config, Gateway};

/// wotgate - Web of Things gateway
#[derive(Parser)]
#[command(name = "wotgate", version, about)]
struct Cli {
    /// Port to listen on (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,wotgate=info",
        1 => "info,wotgate=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!(
        port = config.server.port,
        things = config.things.len(),
        data_dir = %config.data_dir.display(),
        "starting wotgate"
    );
    tracing::debug!(?config, "loaded configuration");

    let gateway = Gateway::new(config).await?;
    gateway.run().await?;

    Ok(())
}
