//! Seam between the orchestrator and the ledger it drives.
//!
//! [`Ledger`] is the whole surface the agent needs: token balance reads,
//! transfers, burns, program invocations and a read of the distribution
//! engine account. Every write resolves only after the ledger reports the
//! requested [`Commitment`].
//!
//! Two implementations ship with the crate: [`RpcLedger`] speaks JSON-RPC to
//! a ledger gateway, [`SimulatedLedger`] keeps everything in memory for demos
//! and tests.

pub mod keypair;
pub mod rpc;
pub mod simulated;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reward::{DistributionRatios, RewardLedgerState};

pub use keypair::Keypair;
pub use rpc::RpcLedger;
pub use simulated::{EnginePools, Fault, LedgerCall, SimulatedLedger, SwapRoute};

/// Program methods the agent invokes.
pub mod methods {
    /// Mock swap: revenue asset → reward asset.
    pub const SWAP_FOR_REWARD: &str = "swap_usdc_for_haio";
    /// Mock swap: revenue asset → external payment asset.
    pub const SWAP_FOR_PAYMENT: &str = "swap_usdc_for_ath";
    /// Distribution engine: split the revenue safe into the reward pools.
    pub const DISTRIBUTE: &str = "distribute_revenue";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("could not find account: {0}")]
    AccountNotFound(String),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("rpc transport error: {0}")]
    Rpc(String),

    #[error("program error {code}: {message}")]
    Program { code: i64, message: String },

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("signing error: {0}")]
    Signing(String),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Base58 text form of a 32-byte account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match bs58::decode(s).into_vec() {
            Ok(bytes) if bytes.len() == 32 => Ok(Self(s.to_string())),
            _ => Err(LedgerError::InvalidAddress(s.to_string())),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub mint: Address,
    pub from: Address,
    pub to: Address,
    pub authority: Arc<Keypair>,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct BurnRequest {
    pub mint: Address,
    pub owner: Address,
    pub authority: Arc<Keypair>,
    pub amount: u64,
}

/// A named account passed to a program instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub name: String,
    pub address: Address,
}

impl AccountRef {
    pub fn new(name: impl Into<String>, address: &Address) -> Self {
        Self {
            name: name.into(),
            address: address.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgramCall {
    pub program_id: Address,
    pub method: String,
    pub accounts: Vec<AccountRef>,
    pub args: serde_json::Value,
    pub signers: Vec<Arc<Keypair>>,
}

impl ProgramCall {
    pub fn account(&self, name: &str) -> Option<&Address> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.address)
    }
}

/// Snapshot of the distribution engine account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub revenue_safe: Address,
    pub reward_pool: Address,
    pub dao_treasury: Address,
    pub developer_treasury: Address,
    pub ratios: DistributionRatios,
    pub rewards: RewardLedgerState,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Token balance of `owner` for `mint`, in base units.
    ///
    /// Fails with [`LedgerError::AccountNotFound`] when the token account
    /// does not exist yet.
    async fn get_balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError>;

    async fn transfer(&self, request: TransferRequest) -> Result<Confirmation, LedgerError>;

    async fn burn(&self, request: BurnRequest) -> Result<Confirmation, LedgerError>;

    async fn invoke_program(&self, call: ProgramCall) -> Result<Confirmation, LedgerError>;

    async fn fetch_engine_state(&self, engine: &Address) -> Result<EngineState, LedgerError>;
}
