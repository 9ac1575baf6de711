//! Agent configuration.
//!
//! Values come from an optional YAML file whose keys are the lowercase
//! environment variable names (`rpc_url`, `burn_ratio_bps`, ...), overlaid by
//! the process environment. The merged [`RawConfig`] is then validated into an
//! [`AgentConfig`]; any missing or malformed required key fails startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{AgentError, Result};
use crate::ledger::{Address, Commitment, Keypair};
use crate::reward::BPS_DENOMINATOR;

pub const DEFAULT_DB_PATH: &str = "agent_data.redb";
pub const DEFAULT_PORT: u16 = 3001;
/// 100 revenue units at 6 decimals.
pub const DEFAULT_SIMULATE_AMOUNT: u64 = 100_000_000;
const MAX_DECIMALS: u32 = 18;

const REQUIRED_KEYS: &[&str] = &[
    "RPC_URL",
    "ADMIN_KEYPAIR_PATH",
    "OPERATIONAL_KEYPAIR_PATH",
    "REVENUE_MINT",
    "REWARD_MINT",
    "PAYMENT_MINT",
    "ENGINE_PROGRAM_ID",
    "ENGINE_STATE_ADDRESS",
    "REVENUE_SAFE_ADDRESS",
    "SWAP_PROGRAM_ID",
    "SWAP_REVENUE_VAULT",
    "SWAP_REWARD_VAULT",
    "SWAP_PAYMENT_VAULT",
    "REVENUE_THRESHOLD",
    "CYCLE_INTERVAL_MS",
    "BURN_RATIO_BPS",
    "PAYMENT_RATIO_BPS",
    "PAYMENT_DESTINATION",
];

const OPTIONAL_KEYS: &[&str] = &[
    "REVENUE_DECIMALS",
    "REWARD_DECIMALS",
    "PAYMENT_DECIMALS",
    "DB_PATH",
    "PORT",
    "DEFAULT_SIMULATE_AMOUNT",
    "COMMITMENT",
];

// ---------------------------------------------------------------------------
// RawConfig
// ---------------------------------------------------------------------------

/// Unvalidated key/value layer, keyed by upper-case variable name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawConfig {
    values: BTreeMap<String, String>,
}

impl RawConfig {
    /// Parse a YAML mapping of scalar values.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let parsed: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(data)?;
        let mut values = BTreeMap::new();
        for (key, value) in parsed {
            let key = key.to_ascii_uppercase();
            if !is_known_key(&key) {
                warn!(key = %key, "ignoring unknown configuration key");
                continue;
            }
            let text = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => continue,
                _ => {
                    return Err(AgentError::InvalidConfig {
                        key,
                        reason: "expected a scalar value".into(),
                    })
                }
            };
            values.insert(key, text);
        }
        Ok(Self { values })
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    /// Overlay every known key that `lookup` resolves.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for key in REQUIRED_KEYS.iter().chain(OPTIONAL_KEYS) {
            if let Some(v) = lookup(key) {
                self.values.insert((*key).to_string(), v);
            }
        }
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_uppercase(), value.into());
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| AgentError::MissingConfig(key.to_string()))
    }

    fn address(&self, key: &str) -> Result<Address> {
        self.required(key)?
            .parse()
            .map_err(|e: crate::ledger::LedgerError| invalid(key, e.to_string()))
    }

    fn integer<T: std::str::FromStr>(&self, key: &str, value: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e: T::Err| invalid(key, e.to_string()))
    }

    fn required_int<T: std::str::FromStr>(&self, key: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let value = self.required(key)?;
        self.integer(key, value)
    }

    fn optional_int<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(value) => self.integer(key, value),
            None => Ok(default),
        }
    }

    fn bps(&self, key: &str) -> Result<u16> {
        let value: u16 = self.required_int(key)?;
        if u64::from(value) > BPS_DENOMINATOR {
            return Err(invalid(key, format!("{value} exceeds {BPS_DENOMINATOR}")));
        }
        Ok(value)
    }

    fn decimals(&self, key: &str, default: u32) -> Result<u32> {
        let value = self.optional_int(key, default)?;
        if value > MAX_DECIMALS {
            return Err(invalid(
                key,
                format!("{value} is not a supported decimals count"),
            ));
        }
        Ok(value)
    }

    fn commitment(&self) -> Result<Commitment> {
        match self.get("COMMITMENT").map(str::to_ascii_lowercase).as_deref() {
            None | Some("finalized") => Ok(Commitment::Finalized),
            Some("confirmed") => Ok(Commitment::Confirmed),
            Some("processed") => Ok(Commitment::Processed),
            Some(other) => Err(invalid(
                "COMMITMENT",
                format!("'{other}' is not one of processed, confirmed, finalized"),
            )),
        }
    }

    fn keypair(&self, key: &str) -> Result<Arc<Keypair>> {
        Ok(Arc::new(Keypair::read_file(Path::new(self.required(key)?))?))
    }

    /// Validate into a typed config, loading both keypair files.
    pub fn validate(&self) -> Result<AgentConfig> {
        // Report every missing key at once.
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| self.get(k).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::MissingConfig(missing.join(", ")));
        }

        let revenue_threshold: u64 = self.required_int("REVENUE_THRESHOLD")?;
        if revenue_threshold == 0 {
            return Err(invalid("REVENUE_THRESHOLD", "must be positive".into()));
        }
        let interval_ms: u64 = self.required_int("CYCLE_INTERVAL_MS")?;
        if interval_ms == 0 {
            return Err(invalid("CYCLE_INTERVAL_MS", "must be positive".into()));
        }

        let cycle = CycleSettings {
            operator: self.keypair("OPERATIONAL_KEYPAIR_PATH")?,
            admin: self.keypair("ADMIN_KEYPAIR_PATH")?,
            revenue: AssetInfo {
                symbol: "USDC".into(),
                mint: self.address("REVENUE_MINT")?,
                decimals: self.decimals("REVENUE_DECIMALS", 6)?,
            },
            reward: AssetInfo {
                symbol: "HAIO".into(),
                mint: self.address("REWARD_MINT")?,
                decimals: self.decimals("REWARD_DECIMALS", 9)?,
            },
            payment: AssetInfo {
                symbol: "ATH".into(),
                mint: self.address("PAYMENT_MINT")?,
                decimals: self.decimals("PAYMENT_DECIMALS", 9)?,
            },
            engine_program_id: self.address("ENGINE_PROGRAM_ID")?,
            engine_state: self.address("ENGINE_STATE_ADDRESS")?,
            revenue_safe: self.address("REVENUE_SAFE_ADDRESS")?,
            swap_program_id: self.address("SWAP_PROGRAM_ID")?,
            swap_revenue_vault: self.address("SWAP_REVENUE_VAULT")?,
            swap_reward_vault: self.address("SWAP_REWARD_VAULT")?,
            swap_payment_vault: self.address("SWAP_PAYMENT_VAULT")?,
            revenue_threshold,
            burn_ratio_bps: self.bps("BURN_RATIO_BPS")?,
            payment_ratio_bps: self.bps("PAYMENT_RATIO_BPS")?,
            payment_destination: self.address("PAYMENT_DESTINATION")?,
        };
        Ok(AgentConfig {
            rpc_url: self.required("RPC_URL")?.to_string(),
            commitment: self.commitment()?,
            db_path: PathBuf::from(self.get("DB_PATH").unwrap_or(DEFAULT_DB_PATH)),
            port: self.optional_int("PORT", DEFAULT_PORT)?,
            cycle_interval: Duration::from_millis(interval_ms),
            default_simulate_amount: self
                .optional_int("DEFAULT_SIMULATE_AMOUNT", DEFAULT_SIMULATE_AMOUNT)?,
            cycle,
        })
    }
}

fn is_known_key(key: &str) -> bool {
    REQUIRED_KEYS.contains(&key) || OPTIONAL_KEYS.contains(&key)
}

fn invalid(key: &str, reason: String) -> AgentError {
    AgentError::InvalidConfig {
        key: key.to_string(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub symbol: String,
    pub mint: Address,
    pub decimals: u32,
}

/// Everything one orchestrator cycle needs.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Operating account: source of every swap, burn and transfer.
    pub operator: Arc<Keypair>,
    /// Funding authority and swap co-signer.
    pub admin: Arc<Keypair>,
    pub revenue: AssetInfo,
    pub reward: AssetInfo,
    pub payment: AssetInfo,
    pub engine_program_id: Address,
    pub engine_state: Address,
    pub revenue_safe: Address,
    pub swap_program_id: Address,
    pub swap_revenue_vault: Address,
    pub swap_reward_vault: Address,
    pub swap_payment_vault: Address,
    /// Minimum revenue balance, in base units, that starts a cycle.
    pub revenue_threshold: u64,
    pub burn_ratio_bps: u16,
    pub payment_ratio_bps: u16,
    pub payment_destination: Address,
}

impl CycleSettings {
    pub fn assets(&self) -> [&AssetInfo; 3] {
        [&self.revenue, &self.reward, &self.payment]
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub rpc_url: String,
    /// Level every ledger call waits for before it returns.
    pub commitment: Commitment,
    pub db_path: PathBuf,
    pub port: u16,
    pub cycle_interval: Duration,
    pub default_simulate_amount: u64,
    pub cycle: CycleSettings,
}

impl AgentConfig {
    /// Optional YAML file overlaid by the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let raw = match path {
            Some(p) => RawConfig::load_file(p)?,
            None => RawConfig::default(),
        };
        raw.overlay(|k| std::env::var(k).ok()).validate()
    }
}
