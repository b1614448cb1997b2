//! Standalone mock server.
//!
//! Configuration comes from the environment:
//! `SONIC_ADDR` (default `127.0.0.1:1491`), `SONIC_PASSWORD` and
//! `SONIC_BUFFER` (longest command line in bytes). Log verbosity follows
//! `RUST_LOG`.

use std::env;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sonic_server::ServerConfig;

fn config_from_env() -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();
    if let Ok(addr) = env::var("SONIC_ADDR") {
        config.addr = addr
            .parse()
            .with_context(|| format!("invalid SONIC_ADDR: {addr}"))?;
    }
    if let Ok(password) = env::var("SONIC_PASSWORD") {
        config.password = password;
    }
    if let Ok(buffer) = env::var("SONIC_BUFFER") {
        config.buffer_size = buffer
            .parse()
            .with_context(|| format!("invalid SONIC_BUFFER: {buffer}"))?;
        anyhow::ensure!(config.buffer_size > 0, "SONIC_BUFFER must be positive");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config_from_env()?;
    sonic_server::run(config).await.context("sonic server stopped")
}
