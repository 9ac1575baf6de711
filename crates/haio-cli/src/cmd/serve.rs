use std::sync::Arc;

use anyhow::Context;
use haio_core::config::AgentConfig;
use haio_core::Orchestrator;
use haio_server::AppState;
use tracing::info;

use crate::source::Source;

pub fn run(source: &Source, port: Option<u16>) -> anyhow::Result<()> {
    let (config, orchestrator) = source.orchestrator()?;
    let port = port.unwrap_or(config.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(config, orchestrator, port))
}

async fn serve(config: AgentConfig, orchestrator: Arc<Orchestrator>, port: u16) -> anyhow::Result<()> {
    orchestrator
        .startup()
        .await
        .context("startup recovery failed")?;
    let timer = haio_server::spawn_cycle_timer(orchestrator.clone(), config.cycle_interval);
    let state = AppState::new(orchestrator, config.default_simulate_amount);

    // An interrupted cycle is marked failed by the next startup.
    let result = tokio::select! {
        served = haio_server::serve(state, port) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };
    timer.abort();
    result
}
