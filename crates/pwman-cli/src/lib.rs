//! Shared plumbing of the `pwman` and `pwserv` binaries

pub mod commands;
pub mod password;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr log subscriber. `--verbose` switches to `debug`.
pub fn init_logging(verbose: bool, default_level: &str) {
    let filter = if verbose { "debug" } else { default_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
