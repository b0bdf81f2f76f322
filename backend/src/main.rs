use std::sync::Arc;

use anyhow::Context;
use backend::{
    config::AppConfig,
    logger::init_tracing,
    router::{PortRouter, Services},
    server::serve,
};
use bclient::BandcampClient;
use tokio::net::TcpListener;

/// Builds the Bandcamp client shared by the API and download paths.
fn build_client(cfg: &AppConfig) -> anyhow::Result<Arc<BandcampClient>> {
    if cfg.bandcamp_identity.is_none() {
        tracing::warn!("BANDCAMP_IDENTITY not set; collection calls will be rejected");
    }

    let client = BandcampClient::new(
        cfg.bandcamp_base_url.clone(),
        cfg.http_timeout,
        cfg.bandcamp_identity.as_deref(),
    )
    .context("building bandcamp client")?;

    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting Bandcamp Enhancement Suite backend...");

    let cfg = AppConfig::from_env();

    let client = build_client(&cfg)?;
    let services = Services::new(client.clone(), client, cfg.clone());
    let router = PortRouter::new(services);

    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr))?;

    tokio::select! {
        res = serve(listener, router.clone()) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(active_ports = router.active_ports().await, "Shutdown signal received");
        }
    }

    router.services().counters.log_snapshot();
    Ok(())
}
