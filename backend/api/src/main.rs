//! Tree adoption API gateway: entry point.
//!
//! Proxies payment-intent creation to Stripe and NFT asset uploads/deletes
//! to Cloudinary, and hosts the tree-persona chat and species enrichment
//! endpoints backed by a hosted language model.

mod api;
mod assets;
mod chat;
mod config;
mod enrichment;
mod errors;
mod inference;
mod payments;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::ApiState;
use assets::CloudinaryClient;
use chat::ChatService;
use config::Config;
use enrichment::TreeEnricher;
use inference::ModelChain;
use payments::StripeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    config.log_summary();

    // One connection pool for every vendor.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let chain = ModelChain::new(
        inference::from_config(client.clone(), &config.ai),
        config.ai.primary_model.clone(),
        config.ai.fallback_model.clone(),
    );
    let state = Arc::new(ApiState {
        payments: Arc::new(StripeClient::new(
            client.clone(),
            config.stripe_secret_key.clone(),
        )),
        assets: Arc::new(CloudinaryClient::new(client, config.cloudinary.clone())),
        chat: ChatService::new(chain.clone()),
        enricher: TreeEnricher::new(chain),
        config: Arc::new(config),
    });

    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = api::router(state);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
