use std::sync::Arc;

use haio_core::store::StatusDb;
use haio_core::Orchestrator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Funding amount for `POST /api/simulate-and-run` without a body.
    pub default_simulate_amount: u64,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, default_simulate_amount: u64) -> Self {
        Self {
            orchestrator,
            default_simulate_amount,
        }
    }

    pub fn store(&self) -> Arc<StatusDb> {
        self.orchestrator.store().clone()
    }
}
