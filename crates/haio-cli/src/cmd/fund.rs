use anyhow::{anyhow, Context};
use haio_core::amount::parse_token_amount;
use haio_core::Orchestrator;

use crate::output::print_json;
use crate::source::Source;

pub fn run(source: &Source, amount: &str, then_run: bool, json: bool) -> anyhow::Result<()> {
    let (_, orchestrator) = source.orchestrator()?;
    let revenue = &orchestrator.settings().revenue;
    let base_units = parse_token_amount(amount, revenue.decimals)?;
    let base_units = u64::try_from(base_units)
        .map_err(|_| anyhow!("amount {amount} {} is too large", revenue.symbol))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(fund(&orchestrator, amount, base_units, then_run, json))
}

async fn fund(
    orchestrator: &Orchestrator,
    shown: &str,
    base_units: u64,
    then_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let confirmation = orchestrator
        .fund_operating_account(base_units)
        .await
        .context("funding transfer failed")?;
    let outcome = if then_run {
        Some(orchestrator.run_cycle_once().await)
    } else {
        None
    };

    if json {
        return print_json(&serde_json::json!({
            "amount": base_units,
            "signature": confirmation.signature,
            "cycle": outcome,
        }));
    }
    println!(
        "Funded {shown} {} (signature {})",
        orchestrator.settings().revenue.symbol,
        confirmation.signature
    );
    if let Some(outcome) = &outcome {
        super::run_once::report(outcome, false)?;
    }
    Ok(())
}
