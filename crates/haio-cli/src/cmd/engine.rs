use haio_core::amount::format_default;
use haio_core::reward::BPS_DENOMINATOR;

use crate::output::{print_fields, print_json};
use crate::source::Source;

fn percent(bps: u16) -> String {
    format_default(bps as u128, 2) + "%"
}

pub fn run(source: &Source, json: bool) -> anyhow::Result<()> {
    let (_, orchestrator) = source.orchestrator()?;
    let rt = tokio::runtime::Runtime::new()?;
    let engine = rt.block_on(orchestrator.engine_snapshot())?;

    if json {
        return print_json(&engine);
    }

    let ratios = engine.ratios;
    let kept = (BPS_DENOMINATOR as u16)
        .saturating_sub(ratios.staking_bps)
        .saturating_sub(ratios.dao_bps)
        .saturating_sub(ratios.developer_bps);
    let last = engine
        .rewards
        .last_distribution_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".into());
    print_fields(&[
        ("Revenue safe", engine.revenue_safe.to_string()),
        ("Reward pool", engine.reward_pool.to_string()),
        ("DAO treasury", engine.dao_treasury.to_string()),
        ("Developer treasury", engine.developer_treasury.to_string()),
        ("Stakers", percent(ratios.staking_bps)),
        ("DAO", percent(ratios.dao_bps)),
        ("Developer", percent(ratios.developer_bps)),
        ("Kept in safe", percent(kept)),
        ("Staked units", engine.rewards.total_staked_units.to_string()),
        (
            "Reward per unit",
            engine.rewards.cumulative_reward_per_unit.to_string(),
        ),
        ("Last distribution", last),
    ]);
    Ok(())
}
