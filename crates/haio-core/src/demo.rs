//! Self-contained demo deployment on a [`SimulatedLedger`].
//!
//! All identities derive from fixed seeds, so repeated runs see the same
//! addresses. The mock swap pays 50 reward units and 1 payment unit per
//! revenue unit, matching the decimals of the live deployment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AgentConfig, AssetInfo, CycleSettings, DEFAULT_PORT, DEFAULT_SIMULATE_AMOUNT};
use crate::ledger::{
    methods, Address, Commitment, EnginePools, Keypair, SimulatedLedger, SwapRoute,
};
use crate::reward::DistributionRatios;

pub const REWARD_PER_REVENUE_UNIT: u64 = 50;
pub const PAYMENT_PER_REVENUE_UNIT: u64 = 1;

/// Revenue held by the admin account for funding transfers (10,000 units).
pub const ADMIN_REVENUE_FLOAT: u64 = 10_000_000_000;
/// Swap vault liquidity, in output base units.
pub const VAULT_LIQUIDITY: u64 = 1_000_000_000_000_000_000;

fn seeded(tag: u8) -> Address {
    Keypair::from_seed([tag; 32]).pubkey()
}

/// Tunables of a demo deployment.
#[derive(Debug, Clone)]
pub struct DemoParams {
    pub revenue_threshold: u64,
    pub burn_ratio_bps: u16,
    pub payment_ratio_bps: u16,
    pub ratios: DistributionRatios,
    /// Stakes opened before the first distribution.
    pub stakes: Vec<u64>,
}

impl Default for DemoParams {
    fn default() -> Self {
        Self {
            revenue_threshold: 500_000,
            burn_ratio_bps: 5_000,
            payment_ratio_bps: 1_000,
            ratios: DistributionRatios {
                staking_bps: 7_000,
                dao_bps: 2_000,
                developer_bps: 1_000,
            },
            stakes: vec![1, 3],
        }
    }
}

/// Demo holder addresses for the configured stakes, in order.
pub fn holder(index: usize) -> Address {
    seeded(200u8.wrapping_add(index as u8))
}

pub fn settings(params: &DemoParams) -> CycleSettings {
    CycleSettings {
        operator: Arc::new(Keypair::from_seed([1; 32])),
        admin: Arc::new(Keypair::from_seed([2; 32])),
        revenue: AssetInfo {
            symbol: "USDC".into(),
            mint: seeded(10),
            decimals: 6,
        },
        reward: AssetInfo {
            symbol: "HAIO".into(),
            mint: seeded(11),
            decimals: 9,
        },
        payment: AssetInfo {
            symbol: "ATH".into(),
            mint: seeded(12),
            decimals: 9,
        },
        engine_program_id: seeded(20),
        engine_state: seeded(21),
        revenue_safe: seeded(22),
        swap_program_id: seeded(30),
        swap_revenue_vault: seeded(31),
        swap_reward_vault: seeded(32),
        swap_payment_vault: seeded(33),
        revenue_threshold: params.revenue_threshold,
        burn_ratio_bps: params.burn_ratio_bps,
        payment_ratio_bps: params.payment_ratio_bps,
        payment_destination: seeded(40),
    }
}

/// Engine pool accounts of the demo deployment.
pub fn pools(settings: &CycleSettings) -> EnginePools {
    EnginePools {
        revenue_safe: settings.revenue_safe.clone(),
        reward_pool: seeded(23),
        dao_treasury: seeded(24),
        developer_treasury: seeded(25),
    }
}

/// A ledger with every account the cycle touches created and the vaults
/// and admin account funded. The operating account starts empty.
pub fn ledger(settings: &CycleSettings, params: &DemoParams) -> SimulatedLedger {
    let ledger = SimulatedLedger::new();
    let op = settings.operator.pubkey();
    let admin = settings.admin.pubkey();
    let (usdc, haio, ath) = (
        &settings.revenue.mint,
        &settings.reward.mint,
        &settings.payment.mint,
    );

    for mint in [usdc, haio, ath] {
        ledger.set_balance(mint, &op, 0);
    }
    ledger.set_balance(usdc, &admin, ADMIN_REVENUE_FLOAT);
    ledger.set_balance(usdc, &settings.swap_revenue_vault, 0);
    ledger.set_balance(haio, &settings.swap_reward_vault, VAULT_LIQUIDITY);
    ledger.set_balance(ath, &settings.swap_payment_vault, VAULT_LIQUIDITY);
    ledger.set_balance(ath, &settings.payment_destination, 0);

    ledger.add_swap_route(
        methods::SWAP_FOR_REWARD,
        SwapRoute {
            input_mint: usdc.clone(),
            output_mint: haio.clone(),
            rate: REWARD_PER_REVENUE_UNIT,
            input_decimals: settings.revenue.decimals,
            output_decimals: settings.reward.decimals,
        },
    );
    ledger.add_swap_route(
        methods::SWAP_FOR_PAYMENT,
        SwapRoute {
            input_mint: usdc.clone(),
            output_mint: ath.clone(),
            rate: PAYMENT_PER_REVENUE_UNIT,
            input_decimals: settings.revenue.decimals,
            output_decimals: settings.payment.decimals,
        },
    );

    ledger.install_engine(&settings.engine_state, haio, pools(settings), params.ratios);
    for (i, units) in params.stakes.iter().enumerate() {
        // Fresh engine, total stake bounded by the demo parameters.
        let _ = ledger.stake(&holder(i), *units);
    }
    ledger
}

/// Config for running the agent against the demo ledger.
pub fn config(params: &DemoParams, db_path: PathBuf) -> AgentConfig {
    AgentConfig {
        rpc_url: "simulated://local".into(),
        commitment: Commitment::Finalized,
        db_path,
        port: DEFAULT_PORT,
        cycle_interval: Duration::from_secs(30),
        default_simulate_amount: DEFAULT_SIMULATE_AMOUNT,
        cycle: settings(params),
    }
}
