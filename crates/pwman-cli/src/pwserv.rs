//! pwserv - keeps container passwords in memory for pwman
//!
//! Listens on `/tmp/<user>.pwman` (`<home>/pwman.sock` on Windows) by
//! default, or on localhost TCP with `--tcp`. Stops on SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use pwman_agent::{install_signal_handler, Agent, Endpoint, ServeMode, DEFAULT_TCP_PORT};
use tracing::info;

#[derive(Parser)]
#[command(name = "pwserv")]
#[command(author, version, about = "Credential cache agent for pwman")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Listen on localhost TCP instead of the local socket
    #[arg(long)]
    tcp: bool,

    /// TCP port
    #[arg(long, default_value_t = DEFAULT_TCP_PORT, requires = "tcp")]
    port: u16,

    /// Serve connections concurrently instead of one at a time
    #[arg(long)]
    concurrent: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    pwman_cli::init_logging(cli.verbose, "info");

    let endpoint = if cli.tcp {
        Endpoint::tcp(cli.port)
    } else {
        Endpoint::local().context("Unable to determine socket path")?
    };
    let mode = if cli.concurrent {
        ServeMode::Concurrent
    } else {
        ServeMode::Sequential
    };

    let shutdown = install_signal_handler();
    let worker = Agent::new(endpoint)
        .with_mode(mode)
        .start(shutdown)
        .await
        .context("Unable to start pwserv")?;

    worker.await.context("Agent task failed")?;
    info!("pwserv terminated");
    Ok(())
}
