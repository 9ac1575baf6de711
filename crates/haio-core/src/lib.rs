pub mod amount;
pub mod config;
pub mod demo;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod reward;
pub mod status;
pub mod store;

pub use error::{AgentError, Result};
pub use orchestrator::{CycleOutcome, Orchestrator};
