//! Tree NFT contract deployer: entry point.
//!
//! Loads (or creates) the plaintext deployment key, makes sure the account
//! holds enough APT, then publishes the Move package with the Aptos CLI.

mod aptos;
mod config;
mod errors;
mod keyfile;
mod publish;

use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aptos::AptosClient;
use config::Args;
use errors::DeployError;
use publish::PublishPlan;

/// Faucet mints are not instantly visible to the view endpoint.
const FUNDING_SETTLE_DELAY: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // .env values feed clap's `env` fallbacks, so load them first.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    args.validate()?;

    let node_url = args.node_url();
    info!("Deploying to {:?} via {node_url}", args.network);

    let (key, created) = keyfile::load_or_generate(&args.key_file)?;
    let address = key.address();
    if created {
        warn!(
            "{} holds an unencrypted private key; keep it out of version control",
            args.key_file.display()
        );
    }

    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let aptos = AptosClient::new(client, node_url.clone());

    let mut balance = aptos.balance(&address).await?;
    info!("Account {address} holds {balance} octas");

    if balance < args.min_balance {
        match args.faucet_url() {
            Some(faucet) => {
                info!("Requesting {} octas from {faucet}", args.min_balance);
                aptos.fund(&faucet, &address, args.min_balance).await?;
                tokio::time::sleep(FUNDING_SETTLE_DELAY).await;
                balance = aptos.balance(&address).await?;
                info!("Balance after funding: {balance} octas");
            }
            None => warn!("No faucet available for {:?}", args.network),
        }
    }

    if balance < args.min_balance {
        return Err(DeployError::InsufficientBalance {
            address,
            balance,
            required: args.min_balance,
        }
        .into());
    }

    if args.dry_run {
        info!("Dry run: skipping publish");
        return Ok(());
    }

    PublishPlan {
        aptos_cli: &args.aptos_cli,
        package_dir: &args.package_dir,
        named_address: &args.named_address,
        node_url: &node_url,
    }
    .run(&key)
    .await?;

    info!("Published {} at {address}", args.package_dir.display());
    Ok(())
}
