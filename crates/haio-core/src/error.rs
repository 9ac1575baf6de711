use thiserror::Error;

use crate::amount::AmountError;
use crate::ledger::LedgerError;
use crate::reward::RewardError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("failed to load keypair from {path}: {reason}")]
    Keypair { path: String, reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("status store error: {0}")]
    StatusDb(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Reward(#[from] RewardError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
