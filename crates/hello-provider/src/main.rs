//! Reference provider for papiea.
//!
//! Registers a `Location` kind (a `moveX` procedure and an intent handler
//! on `x`) plus a provider-level `ping`, then serves engine callbacks
//! until Ctrl-C.
//!
//! Usage:
//!   PAPIEA_ADMIN_S2S_KEY=secret papiea-hello-provider --config hello-provider.toml
//!
//! Env vars (override the file, overridden by flags):
//!   PAPIEA_URL, PAPIEA_ADMIN_S2S_KEY, PROVIDER_HOST, PROVIDER_PORT

mod cli;
mod location;

use anyhow::Context;
use clap::Parser;
use papiea_sdk::ProviderSdk;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    // ── Config ─────────────────────────────────────────────────────
    let cli = cli::Cli::parse();
    let config = cli.load_config()?;
    tracing::info!(
        engine = %config.engine.base_url,
        callback_host = %config.server.public_host,
        callback_port = config.server.public_port,
        "configuration loaded"
    );

    // ── Provider ───────────────────────────────────────────────────
    let span = tracing::info_span!("provider", prefix = location::PREFIX);
    let mut sdk = ProviderSdk::builder()
        .config(&config)
        .span(span)
        .build()
        .context("building provider SDK")?;
    location::install(&mut sdk).context("describing provider")?;
    sdk.register().await.context("registering with the engine")?;

    if let Some(addr) = sdk.local_addr() {
        tracing::info!(%addr, "serving callbacks");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    sdk.shutdown().await;
    Ok(())
}
