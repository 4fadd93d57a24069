//! Main entry point for the pool daemon.

use lode_pool::{config::Config, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = Config::from_env()?;
    Daemon::new(config).run().await
}
