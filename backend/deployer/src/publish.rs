//! `aptos move publish` invocation.

use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::errors::{DeployError, Result};
use crate::keyfile::DeploymentKey;

pub struct PublishPlan<'a> {
    pub aptos_cli: &'a str,
    pub package_dir: &'a Path,
    pub named_address: &'a str,
    pub node_url: &'a str,
}

impl PublishPlan<'_> {
    pub fn args(&self, key: &DeploymentKey) -> Vec<String> {
        vec![
            "move".into(),
            "publish".into(),
            "--package-dir".into(),
            self.package_dir.display().to_string(),
            "--named-addresses".into(),
            format!("{}={}", self.named_address, key.address()),
            "--private-key".into(),
            key.private_key_hex(),
            "--sender-account".into(),
            key.address(),
            "--url".into(),
            self.node_url.to_string(),
            "--assume-yes".into(),
        ]
    }

    /// The argument list with the private key masked, for logging.
    pub fn redacted_args(&self, key: &DeploymentKey) -> Vec<String> {
        let secret = key.private_key_hex();
        self.args(key)
            .into_iter()
            .map(|a| if a == secret { "<redacted>".to_string() } else { a })
            .collect()
    }

    pub async fn run(&self, key: &DeploymentKey) -> Result<()> {
        if !self.package_dir.join("Move.toml").exists() {
            return Err(DeployError::Publish(format!(
                "no Move.toml in {}",
                self.package_dir.display()
            )));
        }

        info!(
            "Running {} {}",
            self.aptos_cli,
            self.redacted_args(key).join(" ")
        );
        let status = Command::new(self.aptos_cli)
            .args(self.args(key))
            .status()
            .await
            .map_err(|e| DeployError::Publish(format!("could not start {}: {e}", self.aptos_cli)))?;

        if !status.success() {
            return Err(DeployError::Publish(format!("{} exited with {status}", self.aptos_cli)));
        }
        Ok(())
    }
}
