//! Reward-per-unit accounting for the staking reward pool.
//!
//! The distribution engine keeps a single monotonic counter,
//! `cumulative_reward_per_unit`, scaled by [`PRECISION`]. Each holder
//! checkpoints the counter into `reward_debt` when staking or claiming; the
//! difference times their stake is what they may claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point scale of `cumulative_reward_per_unit` (10^12).
pub const PRECISION: u128 = 1_000_000_000_000;

/// Basis-point denominator (10000 = 100%).
pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewardError {
    #[error("distribution ratios sum to {0} bps, must be <= 10000")]
    InvalidRatioSum(u32),

    #[error("reward arithmetic overflowed")]
    Overflow,
}

/// Reward claimable by a holder with `staked_units` whose last checkpoint was
/// `debt`, given the current `cumulative` counter.
///
/// Returns zero when `cumulative <= debt`. The product is formed as
/// `q * staked + (r * staked) / precision` where `q, r = divmod(delta,
/// precision)`, which equals `delta * staked / precision` exactly while
/// keeping every intermediate below 128 bits for 64-bit stakes.
pub fn claimable(cumulative: u128, debt: u128, staked_units: u64, precision: u128) -> u128 {
    if cumulative <= debt || precision == 0 {
        return 0;
    }
    let delta = cumulative - debt;
    let staked = staked_units as u128;
    let whole = (delta / precision).saturating_mul(staked);
    let part = match (delta % precision).checked_mul(staked) {
        Some(p) => p / precision,
        None => return u128::MAX,
    };
    whole.saturating_add(part)
}

/// `amount * bps / 10000`, computed in 128 bits.
pub fn apply_bps(amount: u64, bps: u16) -> u64 {
    (amount as u128 * bps as u128 / BPS_DENOMINATOR as u128) as u64
}

/// 128-bit counters travel as decimal strings; JSON numbers lose precision
/// past 2^53 in most clients. Plain numbers are still accepted on input.
mod u128_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }
        match Repr::deserialize(d)? {
            Repr::Text(s) => s.trim().parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(n as u128),
        }
    }
}

// ---------------------------------------------------------------------------
// RewardLedgerState
// ---------------------------------------------------------------------------

/// Mirror of the distribution engine's global accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLedgerState {
    pub total_staked_units: u64,
    /// Scaled by [`PRECISION`]. Never decreases.
    #[serde(with = "u128_string")]
    pub cumulative_reward_per_unit: u128,
    pub last_distribution_time: Option<DateTime<Utc>>,
}

impl RewardLedgerState {
    /// Credit `staker_reward` to every staked unit.
    ///
    /// With nothing staked the counter is left alone and only the timestamp
    /// moves, so the reward sits in the pool unattributed.
    pub fn accrue(&mut self, staker_reward: u64, now: DateTime<Utc>) -> Result<(), RewardError> {
        if self.total_staked_units > 0 && staker_reward > 0 {
            let delta = (staker_reward as u128)
                .checked_mul(PRECISION)
                .and_then(|v| v.checked_div(self.total_staked_units as u128))
                .ok_or(RewardError::Overflow)?;
            self.cumulative_reward_per_unit = self
                .cumulative_reward_per_unit
                .checked_add(delta)
                .ok_or(RewardError::Overflow)?;
        }
        self.last_distribution_time = Some(now);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HolderStakeRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderStakeRecord {
    pub staked_units: u64,
    #[serde(with = "u128_string")]
    pub reward_debt: u128,
    pub is_staked: bool,
}

impl HolderStakeRecord {
    /// Open a stake of `units` against `state`, checkpointing the counter.
    pub fn stake(state: &mut RewardLedgerState, units: u64) -> Result<Self, RewardError> {
        state.total_staked_units = state
            .total_staked_units
            .checked_add(units)
            .ok_or(RewardError::Overflow)?;
        Ok(Self {
            staked_units: units,
            reward_debt: state.cumulative_reward_per_unit,
            is_staked: true,
        })
    }

    pub fn claimable(&self, state: &RewardLedgerState) -> u128 {
        if !self.is_staked {
            return 0;
        }
        claimable(
            state.cumulative_reward_per_unit,
            self.reward_debt,
            self.staked_units,
            PRECISION,
        )
    }

    /// Claim: return the pending reward and move the checkpoint forward.
    pub fn checkpoint(&mut self, state: &RewardLedgerState) -> u128 {
        let reward = self.claimable(state);
        self.reward_debt = state.cumulative_reward_per_unit;
        reward
    }
}

// ---------------------------------------------------------------------------
// Distribution split
// ---------------------------------------------------------------------------

/// Shares of each distribution, in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRatios {
    pub staking_bps: u16,
    pub dao_bps: u16,
    pub developer_bps: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSplit {
    pub staker: u64,
    pub dao: u64,
    pub developer: u64,
    /// Rounding dust and any unallocated share; stays in the revenue safe.
    pub remaining: u64,
}

impl DistributionRatios {
    pub fn new(staking_bps: u16, dao_bps: u16, developer_bps: u16) -> Result<Self, RewardError> {
        let sum = staking_bps as u32 + dao_bps as u32 + developer_bps as u32;
        if sum > BPS_DENOMINATOR as u32 {
            return Err(RewardError::InvalidRatioSum(sum));
        }
        Ok(Self {
            staking_bps,
            dao_bps,
            developer_bps,
        })
    }

    pub fn split(&self, revenue: u64) -> DistributionSplit {
        let staker = apply_bps(revenue, self.staking_bps);
        let dao = apply_bps(revenue, self.dao_bps);
        let developer = apply_bps(revenue, self.developer_bps);
        // Each share is floored and the ratios sum to at most 100%.
        let remaining = revenue - staker - dao - developer;
        DistributionSplit {
            staker,
            dao,
            developer,
            remaining,
        }
    }
}
