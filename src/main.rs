//! redpod binary entry point.

use redstring_pod::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "REDSTRING_LOG";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let default = if cli.debug {
        "redstring_pod=debug"
    } else {
        "redstring_pod=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli)
}
