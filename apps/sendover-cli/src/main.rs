//! SendOver command line entry point.

mod app;
mod bundle;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sendover", version)]
#[command(about = "Peer-to-peer file transfer over ephemeral six-digit codes", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user location).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transfers files between two local peers over a simulated link.
    Send {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory for the received file.
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// One-way link delay in milliseconds.
        #[arg(long)]
        latency_ms: Option<u64>,
    },

    /// Prints the effective configuration.
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting sendover");

    match cli.command {
        Command::Send {
            files,
            out,
            latency_ms,
        } => {
            let out_dir = out.unwrap_or_else(|| config.out_dir());
            let delay = latency_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.link_delay());

            let rt = tokio::runtime::Runtime::new()?;
            let path = rt.block_on(app::send(&config, &files, &out_dir, delay))?;
            println!("{}", path.display());
        }
        Command::Config => {
            let path = match cli.config {
                Some(path) => path,
                None => config::config_path()?,
            };
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            println!("# effective chunk size: {} bytes", config.session_config().chunk_size);
        }
    }
    Ok(())
}
