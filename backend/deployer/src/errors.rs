//! Deployment error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Key file {path} records address {stored} but its key derives {derived}")]
    KeyMismatch {
        path: PathBuf,
        stored: String,
        derived: String,
    },

    #[error("Aptos node returned HTTP {status}: {message}")]
    Node { status: u16, message: String },

    #[error("Refusing to deploy to mainnet with a plaintext key file")]
    MainnetRefused,

    #[error("Balance {balance} octas is below the required {required} octas; fund {address} and retry")]
    InsufficientBalance {
        address: String,
        balance: u64,
        required: u64,
    },

    #[error("Move publish failed: {0}")]
    Publish(String),
}

pub type Result<T> = std::result::Result<T, DeployError>;
