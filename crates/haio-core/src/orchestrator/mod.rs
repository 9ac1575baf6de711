//! The agent cycle orchestrator.
//!
//! One [`Orchestrator`] owns the ledger handle, the status store and the
//! cycle settings. [`Orchestrator::run_cycle_once`] converts the revenue
//! sitting in the operating account into a payment, a burn and a
//! distribution, writing the step to the status store before each step runs
//! and appending at least one log entry per step. At most one cycle runs at a
//! time per orchestrator.

pub mod cycle;
pub mod guard;
pub mod step;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::amount::format_default;
use crate::config::{AssetInfo, CycleSettings};
use crate::error::{AgentError, Result};
use crate::ledger::{
    AccountRef, Address, Confirmation, EngineState, Ledger, LedgerError, ProgramCall,
    TransferRequest,
};
use crate::status::{AgentStatus, CycleStep, Severity, StatusPatch};
use crate::store::StatusDb;

pub use guard::CycleRunGuard;
pub use step::{StepOutcome, Transition};

use cycle::CycleRun;

/// Failures surfaced to the status layer. Whether one ends the cycle is
/// decided by the step it happened in, not by the variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("failed to query {asset} balance: {source}")]
    BalanceQuery { asset: String, source: LedgerError },

    #[error("{asset} swap failed: {source}")]
    SwapExecution { asset: String, source: LedgerError },

    #[error("{target} transfer failed: {source}")]
    TransferExecution { target: String, source: LedgerError },

    #[error("burn failed: {0}")]
    BurnExecution(#[source] LedgerError),

    #[error("distribute_revenue failed: {0}")]
    DistributionExecution(#[source] LedgerError),

    #[error("critical cycle failure: {0}")]
    Critical(String),
}

/// How a call to [`Orchestrator::run_cycle_once`] ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle held the guard; nothing was touched.
    AlreadyRunning,
    BelowThreshold { balance: u64, threshold: u64 },
    Completed,
    CompletedWithErrors { last_error: String },
    Aborted { step: CycleStep, error: String },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    ledger: Arc<dyn Ledger>,
    store: Arc<StatusDb>,
    settings: CycleSettings,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<StatusDb>, settings: CycleSettings) -> Self {
        Self {
            ledger,
            store,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<StatusDb> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle. Returns immediately with
    /// [`CycleOutcome::AlreadyRunning`] if a cycle is in flight.
    ///
    /// Never fails: every error ends up in the status row and the log. A
    /// panic inside a step is caught here and recorded as a critical error.
    pub async fn run_cycle_once(&self) -> CycleOutcome {
        let Some(guard) = CycleRunGuard::try_acquire(&self.running) else {
            debug!("cycle already in flight, ignoring trigger");
            return CycleOutcome::AlreadyRunning;
        };
        let caught = AssertUnwindSafe(CycleRun::new(self).drive())
            .catch_unwind()
            .await
            .map_err(|payload| panic_message(payload.as_ref()));
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(message) => {
                let step = self
                    .with_store(|db| db.get_status())
                    .await
                    .ok()
                    .and_then(|status| status.current_step)
                    .unwrap_or(CycleStep::CheckingBalance);
                let error = CycleError::Critical(format!("cycle panicked: {message}"));
                self.abort_cycle(step, error).await
            }
        };
        drop(guard);
        self.refresh_balances_logged().await;
        info!(?outcome, "agent cycle ended");
        outcome
    }

    /// Move `amount` revenue base units from the admin account into the
    /// operating account.
    pub async fn fund_operating_account(&self, amount: u64) -> Result<Confirmation> {
        if amount == 0 {
            return Err(AgentError::InvalidAmount(
                "funding amount must be positive".into(),
            ));
        }
        let s = &self.settings;
        let shown = self.display(&s.revenue, amount);
        self.log(
            format!("Admin sending {shown} {} to the operating account...", s.revenue.symbol),
            Severity::Process,
            None,
        )
        .await;
        let request = TransferRequest {
            mint: s.revenue.mint.clone(),
            from: s.admin.pubkey(),
            to: s.operator.pubkey(),
            authority: s.admin.clone(),
            amount,
        };
        match self.ledger.transfer(request).await {
            Ok(confirmation) => {
                self.log(
                    format!("Admin sent {shown} {} successfully.", s.revenue.symbol),
                    Severity::Success,
                    Some(confirmation.signature.clone()),
                )
                .await;
                self.refresh_balances_logged().await;
                Ok(confirmation)
            }
            Err(e) => {
                self.log(
                    format!("Admin funding transfer failed: {e}"),
                    Severity::Error,
                    None,
                )
                .await;
                Err(e.into())
            }
        }
    }

    /// Read the operating account balances and store them, formatted, in
    /// the status row.
    pub async fn refresh_balances(&self) -> Result<BTreeMap<String, String>> {
        let mut balances = BTreeMap::new();
        for asset in self.settings.assets() {
            let amount = self.balance_of(&asset.mint).await?;
            balances.insert(asset.symbol.clone(), self.display(asset, amount));
        }
        let stored = balances.clone();
        self.with_store(move |db| db.upsert_status(StatusPatch::default().balances(stored)))
            .await?;
        Ok(balances)
    }

    pub async fn engine_snapshot(&self) -> Result<EngineState> {
        Ok(self
            .ledger
            .fetch_engine_state(&self.settings.engine_state)
            .await?)
    }

    /// Announce startup and repair a status row left in PROCESSING by a
    /// process that died mid-cycle.
    pub async fn startup(&self) -> Result<()> {
        let status = self.with_store(|db| db.get_status()).await?;
        if status.status == AgentStatus::Processing && !self.is_running() {
            let step = status
                .current_step
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown step".into());
            let message = format!("cycle interrupted by restart during {step}");
            warn!(%step, "recovering interrupted cycle");
            let patch = StatusPatch::default()
                .status(AgentStatus::Error)
                .last_error(Some(message.clone()));
            self.with_store(move |db| db.upsert_status(patch)).await?;
            self.log(message, Severity::Error, None).await;
        }

        let s = &self.settings;
        self.log(
            format!(
                "Agent worker started: threshold {} {}, burn {} bps, payment {} bps.",
                self.display(&s.revenue, s.revenue_threshold),
                s.revenue.symbol,
                s.burn_ratio_bps,
                s.payment_ratio_bps
            ),
            Severity::Info,
            None,
        )
        .await;
        self.refresh_balances_logged().await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers shared with the cycle
    // -----------------------------------------------------------------------

    /// Operating-account balance; a token account that does not exist yet
    /// holds zero.
    pub(crate) async fn balance_of(&self, mint: &Address) -> std::result::Result<u64, LedgerError> {
        match self
            .ledger
            .get_balance(mint, &self.settings.operator.pubkey())
            .await
        {
            Ok(amount) => Ok(amount),
            Err(LedgerError::AccountNotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Invoke a mock swap route paying `amount_in` of the revenue asset.
    pub(crate) async fn swap(
        &self,
        method: &str,
        output: &AssetInfo,
        output_vault: &Address,
        amount_in: u64,
    ) -> std::result::Result<Confirmation, LedgerError> {
        let s = &self.settings;
        let operator = s.operator.pubkey();
        let admin = s.admin.pubkey();
        let call = ProgramCall {
            program_id: s.swap_program_id.clone(),
            method: method.to_string(),
            accounts: vec![
                AccountRef::new("operator", &operator),
                AccountRef::new("admin", &admin),
                AccountRef::new("input_mint", &s.revenue.mint),
                AccountRef::new("output_mint", &output.mint),
                AccountRef::new("input_vault", &s.swap_revenue_vault),
                AccountRef::new("output_vault", output_vault),
            ],
            args: serde_json::json!({ "amount_in": amount_in }),
            signers: vec![s.operator.clone(), s.admin.clone()],
        };
        self.ledger.invoke_program(call).await
    }

    pub(crate) async fn distribute(&self) -> std::result::Result<Confirmation, LedgerError> {
        let s = &self.settings;
        let engine = self.ledger.fetch_engine_state(&s.engine_state).await?;
        let call = ProgramCall {
            program_id: s.engine_program_id.clone(),
            method: crate::ledger::methods::DISTRIBUTE.to_string(),
            accounts: vec![
                AccountRef::new("engine_state", &s.engine_state),
                AccountRef::new("revenue_safe", &s.revenue_safe),
                AccountRef::new("reward_pool", &engine.reward_pool),
                AccountRef::new("dao_treasury", &engine.dao_treasury),
                AccountRef::new("developer_treasury", &engine.developer_treasury),
            ],
            args: serde_json::json!({}),
            signers: vec![s.operator.clone()],
        };
        self.ledger.invoke_program(call).await
    }

    pub(crate) fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub(crate) fn display(&self, asset: &AssetInfo, amount: u64) -> String {
        format_default(amount as u128, asset.decimals)
    }

    /// Log the failure, mark the status row ERROR and leave `current_step`
    /// where the cycle died.
    pub(crate) async fn abort_cycle(&self, step: CycleStep, error: CycleError) -> CycleOutcome {
        let message = error.to_string();
        self.log(
            format!("Critical error in agent cycle: {message}"),
            Severity::Error,
            None,
        )
        .await;
        self.patch(
            StatusPatch::default()
                .status(AgentStatus::Error)
                .last_error(Some(message.clone())),
        )
        .await;
        CycleOutcome::Aborted {
            step,
            error: message,
        }
    }

    /// redb commits fsync, so store calls run on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&StatusDb) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| AgentError::StatusDb(format!("store task failed: {e}")))?
    }

    /// Status writes never abort a cycle.
    pub(crate) async fn patch(&self, patch: StatusPatch) {
        if let Err(e) = self.with_store(move |db| db.upsert_status(patch)).await {
            error!(error = %e, "failed to write agent status");
        }
    }

    pub(crate) async fn log(
        &self,
        message: impl Into<String>,
        severity: Severity,
        reference: Option<String>,
    ) {
        let message = message.into();
        match severity {
            Severity::Error => warn!(reference = ?reference, "{message}"),
            _ => info!(reference = ?reference, "{message}"),
        }
        let appended = self
            .with_store(move |db| db.append_log(message, severity, reference))
            .await;
        if let Err(e) = appended {
            error!(error = %e, "failed to append agent log");
        }
    }

    pub(crate) async fn refresh_balances_logged(&self) {
        if let Err(e) = self.refresh_balances().await {
            self.log(
                format!("Balance refresh failed: {e}"),
                Severity::Error,
                None,
            )
            .await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
