use anyhow::Context;
use haio_core::{CycleOutcome, Orchestrator};

use crate::output::print_json;
use crate::source::Source;

pub fn run(source: &Source, json: bool) -> anyhow::Result<()> {
    let (_, orchestrator) = source.orchestrator()?;
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(run_cycle(&orchestrator))?;
    report(&outcome, json)
}

async fn run_cycle(orchestrator: &Orchestrator) -> anyhow::Result<CycleOutcome> {
    orchestrator
        .startup()
        .await
        .context("startup recovery failed")?;
    Ok(orchestrator.run_cycle_once().await)
}

/// Print a cycle outcome. Used by `fund --run` too.
pub fn report(outcome: &CycleOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(outcome);
    }
    match outcome {
        CycleOutcome::AlreadyRunning => println!("A cycle is already running."),
        CycleOutcome::BelowThreshold { balance, threshold } => {
            println!("Revenue balance {balance} is below threshold {threshold}; nothing to do.")
        }
        CycleOutcome::Completed => println!("Cycle completed."),
        CycleOutcome::CompletedWithErrors { last_error } => {
            println!("Cycle completed with errors: {last_error}")
        }
        CycleOutcome::Aborted { step, error } => {
            println!("Cycle aborted during {}: {error}", step.as_str())
        }
    }
    Ok(())
}
