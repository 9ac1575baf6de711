use haio_core::amount::format_default;
use haio_core::reward::{claimable, PRECISION};

use crate::output::print_json;

pub fn run(
    cumulative: u128,
    debt: u128,
    staked: u64,
    decimals: u32,
    json: bool,
) -> anyhow::Result<()> {
    let amount = claimable(cumulative, debt, staked, PRECISION);
    let formatted = format_default(amount, decimals);

    if json {
        return print_json(&serde_json::json!({
            "claimable": amount.to_string(),
            "claimable_formatted": formatted,
        }));
    }
    println!("{formatted} ({amount} base units)");
    Ok(())
}
