//! Command-line flags, each backed by an environment variable.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::errors::{DeployError, Result};

/// 1 APT, enough gas for publishing a small package.
pub const MIN_BALANCE_OCTAS: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Local,
    Devnet,
    Testnet,
    Mainnet,
}

impl Network {
    pub fn default_node_url(&self) -> &'static str {
        match self {
            Self::Local => "http://127.0.0.1:8080/v1",
            Self::Devnet => "https://fullnode.devnet.aptoslabs.com/v1",
            Self::Testnet => "https://fullnode.testnet.aptoslabs.com/v1",
            Self::Mainnet => "https://fullnode.mainnet.aptoslabs.com/v1",
        }
    }

    /// Networks with a public mint faucet.
    pub fn default_faucet_url(&self) -> Option<&'static str> {
        match self {
            Self::Local => Some("http://127.0.0.1:8081"),
            Self::Devnet => Some("https://faucet.devnet.aptoslabs.com"),
            Self::Testnet | Self::Mainnet => None,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "deploy-contract",
    version,
    about = "Publish the tree NFT Move package to an Aptos test network"
)]
pub struct Args {
    /// Target network
    #[arg(long, env = "VITE_APTOS_NETWORK", value_enum, ignore_case = true, default_value = "testnet")]
    pub network: Network,

    /// Fullnode REST URL; defaults to the network's public fullnode
    #[arg(long, env = "VITE_APTOS_NODE_URL")]
    pub node_url: Option<String>,

    /// Faucet URL used when the balance is too low
    #[arg(long, env = "APTOS_FAUCET_URL")]
    pub faucet_url: Option<String>,

    /// Plaintext key file, created on first run
    #[arg(long, env = "DEPLOYMENT_KEY_PATH", default_value = "deployment-key.json")]
    pub key_file: PathBuf,

    /// Directory containing Move.toml
    #[arg(long, default_value = "move")]
    pub package_dir: PathBuf,

    /// Named address in Move.toml bound to the deployment account
    #[arg(long, default_value = "tree_nft")]
    pub named_address: String,

    /// Minimum balance in octas required before publishing
    #[arg(long, default_value_t = MIN_BALANCE_OCTAS)]
    pub min_balance: u64,

    /// Aptos CLI executable
    #[arg(long, env = "APTOS_CLI", default_value = "aptos")]
    pub aptos_cli: String,

    /// Check key and balance, but do not publish
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    pub fn node_url(&self) -> String {
        self.node_url
            .clone()
            .unwrap_or_else(|| self.network.default_node_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn faucet_url(&self) -> Option<String> {
        self.faucet_url
            .clone()
            .or_else(|| self.network.default_faucet_url().map(String::from))
            .map(|u| u.trim_end_matches('/').to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.network == Network::Mainnet {
            return Err(DeployError::MainnetRefused);
        }
        Ok(())
    }
}
