use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use haio_core::config::CycleSettings;
use haio_core::demo::{self, DemoParams};
use haio_core::ledger::{
    methods, Address, BurnRequest, Confirmation, EngineState, Fault, Ledger, LedgerCall,
    LedgerError, ProgramCall, SimulatedLedger, TransferRequest,
};
use haio_core::status::{AgentStatus, CycleStep, Severity, StatusPatch};
use haio_core::store::StatusDb;
use haio_core::{AgentError, CycleOutcome, Orchestrator};

struct Harness {
    _dir: TempDir,
    ledger: Arc<SimulatedLedger>,
    store: Arc<StatusDb>,
    orch: Arc<Orchestrator>,
    settings: CycleSettings,
}

impl Harness {
    fn new(params: DemoParams) -> Self {
        let settings = demo::settings(&params);
        let ledger = Arc::new(demo::ledger(&settings, &params));
        Self::with_ledger(settings, ledger.clone(), ledger)
    }

    fn with_ledger(
        settings: CycleSettings,
        sim: Arc<SimulatedLedger>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StatusDb::open(&dir.path().join("agent.redb")).unwrap());
        let orch = Arc::new(Orchestrator::new(ledger, store.clone(), settings.clone()));
        Self {
            _dir: dir,
            ledger: sim,
            store,
            orch,
            settings,
        }
    }

    fn give_revenue(&self, amount: u64) {
        self.ledger.set_balance(
            &self.settings.revenue.mint,
            &self.settings.operator.pubkey(),
            amount,
        );
    }

    fn balance(&self, mint: &Address, owner: &Address) -> u64 {
        self.ledger.balance_of(mint, owner).unwrap_or(0)
    }

    fn messages(&self) -> Vec<String> {
        self.store
            .recent_logs(1000)
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect()
    }
}

fn invoked(writes: &[LedgerCall], method: &str) -> bool {
    writes
        .iter()
        .any(|c| matches!(c, LedgerCall::Invoke { method: m, .. } if m == method))
}

// ---------------------------------------------------------------------------
// Full cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_cycle_pays_burns_transfers_and_distributes() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    let s = &h.settings;
    let op = s.operator.pubkey();

    assert_eq!(h.orch.run_cycle_once().await, CycleOutcome::Completed);

    let writes = h.ledger.writes();
    assert_eq!(
        writes,
        vec![
            LedgerCall::Invoke {
                method: methods::SWAP_FOR_PAYMENT.into(),
                amount: Some(100_000),
            },
            LedgerCall::Transfer {
                mint: s.payment.mint.clone(),
                from: op.clone(),
                to: s.payment_destination.clone(),
                amount: 100_000_000,
            },
            LedgerCall::Invoke {
                method: methods::SWAP_FOR_REWARD.into(),
                amount: Some(900_000),
            },
            LedgerCall::Burn {
                mint: s.reward.mint.clone(),
                owner: op.clone(),
                amount: 22_500_000_000,
            },
            LedgerCall::Transfer {
                mint: s.reward.mint.clone(),
                from: op.clone(),
                to: s.revenue_safe.clone(),
                amount: 22_500_000_000,
            },
            LedgerCall::Invoke {
                method: methods::DISTRIBUTE.into(),
                amount: None,
            },
        ]
    );

    // 22.5 HAIO split 70/20/10 out of the safe.
    let pools = demo::pools(s);
    assert_eq!(h.balance(&s.reward.mint, &s.revenue_safe), 0);
    assert_eq!(h.balance(&s.reward.mint, &pools.reward_pool), 15_750_000_000);
    assert_eq!(h.balance(&s.reward.mint, &pools.dao_treasury), 4_500_000_000);
    assert_eq!(h.balance(&s.reward.mint, &pools.developer_treasury), 2_250_000_000);
    assert_eq!(h.balance(&s.payment.mint, &s.payment_destination), 100_000_000);
    for mint in [&s.revenue.mint, &s.reward.mint, &s.payment.mint] {
        assert_eq!(h.balance(mint, &op), 0);
    }

    // Holders staked 1 and 3 units before the distribution.
    let engine = h.orch.engine_snapshot().await.unwrap();
    let first = h.ledger.stake_record(&demo::holder(0)).unwrap();
    let second = h.ledger.stake_record(&demo::holder(1)).unwrap();
    assert_eq!(first.claimable(&engine.rewards), 3_937_500_000);
    assert_eq!(second.claimable(&engine.rewards), 11_812_500_000);

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Idle);
    assert_eq!(status.current_step, None);
    assert_eq!(status.last_error, None);
    assert_eq!(status.balances["USDC"], "0");
    assert_eq!(status.balances["HAIO"], "0");

    let messages = h.messages();
    assert!(messages[0].contains("finished successfully"), "{messages:?}");
    assert!(!h.orch.is_running());
}

/// Records the status row's `current_step` at every ledger write.
struct StepProbe {
    inner: Arc<SimulatedLedger>,
    store: Mutex<Option<Arc<StatusDb>>>,
    seen: Mutex<Vec<(String, Option<CycleStep>)>>,
    first_read: Mutex<Option<(AgentStatus, Option<CycleStep>)>>,
}

impl StepProbe {
    fn observe(&self, what: &str) {
        let store = self.store.lock().unwrap().clone();
        if let Some(store) = store {
            let step = store.get_status().unwrap().current_step;
            self.seen.lock().unwrap().push((what.to_string(), step));
        }
    }

    fn observe_first_read(&self) {
        let store = self.store.lock().unwrap().clone();
        let mut first = self.first_read.lock().unwrap();
        if let Some(store) = store.filter(|_| first.is_none()) {
            let status = store.get_status().unwrap();
            *first = Some((status.status, status.current_step));
        }
    }
}

#[async_trait]
impl Ledger for StepProbe {
    async fn get_balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError> {
        self.observe_first_read();
        self.inner.get_balance(mint, owner).await
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Confirmation, LedgerError> {
        self.observe("transfer");
        self.inner.transfer(request).await
    }

    async fn burn(&self, request: BurnRequest) -> Result<Confirmation, LedgerError> {
        self.observe("burn");
        self.inner.burn(request).await
    }

    async fn invoke_program(&self, call: ProgramCall) -> Result<Confirmation, LedgerError> {
        self.observe(&call.method);
        self.inner.invoke_program(call).await
    }

    async fn fetch_engine_state(&self, engine: &Address) -> Result<EngineState, LedgerError> {
        self.inner.fetch_engine_state(engine).await
    }
}

#[tokio::test]
async fn current_step_is_written_before_each_step_runs() {
    let params = DemoParams::default();
    let settings = demo::settings(&params);
    let sim = Arc::new(demo::ledger(&settings, &params));
    let probe = Arc::new(StepProbe {
        inner: sim.clone(),
        store: Mutex::new(None),
        seen: Mutex::new(Vec::new()),
        first_read: Mutex::new(None),
    });
    let h = Harness::with_ledger(settings, sim, probe.clone());
    *probe.store.lock().unwrap() = Some(h.store.clone());
    h.give_revenue(1_000_000);
    h.store
        .upsert_status(StatusPatch::default().step(Some(CycleStep::Done)))
        .unwrap();

    h.orch.run_cycle_once().await;

    assert_eq!(
        *probe.first_read.lock().unwrap(),
        Some((AgentStatus::Processing, Some(CycleStep::CheckingBalance)))
    );

    let seen = probe.seen.lock().unwrap().clone();
    let expected = vec![
        (methods::SWAP_FOR_PAYMENT.to_string(), Some(CycleStep::SwappingAth)),
        ("transfer".to_string(), Some(CycleStep::PayingAth)),
        (methods::SWAP_FOR_REWARD.to_string(), Some(CycleStep::SwappingHaio)),
        ("burn".to_string(), Some(CycleStep::Burning)),
        ("transfer".to_string(), Some(CycleStep::Transferring)),
        (methods::DISTRIBUTE.to_string(), Some(CycleStep::Distributing)),
    ];
    assert_eq!(seen, expected);
}

// ---------------------------------------------------------------------------
// Threshold gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn below_threshold_is_a_quiet_no_op() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(499_999);

    let outcome = h.orch.run_cycle_once().await;
    assert_eq!(
        outcome,
        CycleOutcome::BelowThreshold {
            balance: 499_999,
            threshold: 500_000
        }
    );

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Idle);
    assert_eq!(status.current_step, None);
    assert_eq!(status.balances["USDC"], "0.499999");

    let messages = h.messages();
    assert_eq!(messages.len(), 1, "{messages:?}");
    assert!(messages[0].contains("below threshold"));
    assert!(h.ledger.writes().is_empty());
}

#[tokio::test]
async fn missing_token_account_reads_as_zero() {
    let params = DemoParams::default();
    let settings = demo::settings(&params);
    let empty = Arc::new(SimulatedLedger::new());
    let h = Harness::with_ledger(settings, empty.clone(), empty);

    assert!(matches!(
        h.orch.run_cycle_once().await,
        CycleOutcome::BelowThreshold { balance: 0, .. }
    ));
    assert_eq!(h.store.get_status().unwrap().status, AgentStatus::Idle);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reward_swap_failure_aborts_the_cycle() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    h.ledger
        .inject_fault(Fault::Invoke(methods::SWAP_FOR_REWARD.into()));

    let outcome = h.orch.run_cycle_once().await;
    assert!(
        matches!(outcome, CycleOutcome::Aborted { step: CycleStep::SwappingHaio, .. }),
        "{outcome:?}"
    );

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Error);
    assert_eq!(status.current_step, Some(CycleStep::SwappingHaio));
    let last_error = status.last_error.unwrap();
    assert!(last_error.contains("HAIO swap failed"), "{last_error}");

    let writes = h.ledger.writes();
    assert!(!writes.iter().any(|c| matches!(c, LedgerCall::Burn { .. })));
    assert!(!invoked(&writes, methods::DISTRIBUTE));
    assert!(!writes.iter().any(|c| matches!(
        c,
        LedgerCall::Transfer { to, .. } if *to == h.settings.revenue_safe
    )));

    let messages = h.messages();
    assert!(messages[0].starts_with("Critical error in agent cycle"));
    assert!(!h.orch.is_running());
}

#[tokio::test]
async fn burn_failure_still_transfers_and_distributes() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    h.ledger.inject_fault(Fault::Burn);

    let outcome = h.orch.run_cycle_once().await;
    assert!(
        matches!(outcome, CycleOutcome::CompletedWithErrors { ref last_error } if last_error.contains("burn failed")),
        "{outcome:?}"
    );

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Error);
    assert_eq!(status.current_step, Some(CycleStep::Done));

    // Nothing burned, so the whole 45 HAIO went to the safe.
    let writes = h.ledger.writes();
    assert!(writes.contains(&LedgerCall::Transfer {
        mint: h.settings.reward.mint.clone(),
        from: h.settings.operator.pubkey(),
        to: h.settings.revenue_safe.clone(),
        amount: 45_000_000_000,
    }));
    assert!(invoked(&writes, methods::DISTRIBUTE));
    assert!(h.messages()[0].contains("finished with errors"));
}

#[tokio::test]
async fn transfer_failure_skips_distribution() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    h.ledger
        .inject_fault(Fault::TransferTo(h.settings.revenue_safe.clone()));

    let outcome = h.orch.run_cycle_once().await;
    assert!(matches!(outcome, CycleOutcome::CompletedWithErrors { .. }));
    assert!(!invoked(&h.ledger.writes(), methods::DISTRIBUTE));

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Error);
    assert_eq!(status.current_step, Some(CycleStep::Done));
    assert!(status.last_error.unwrap().contains("revenue safe transfer failed"));
    assert!(h
        .messages()
        .iter()
        .any(|m| m.starts_with("Distribution skipped")));
}

#[tokio::test]
async fn failed_payment_leaves_swapped_funds_and_breaks_reward_swap() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    let s = &h.settings;
    h.ledger
        .inject_fault(Fault::TransferTo(s.payment_destination.clone()));

    let outcome = h.orch.run_cycle_once().await;
    // The cached balance still counts the swapped budget, so the reward
    // swap asks for more than the account holds.
    assert!(
        matches!(outcome, CycleOutcome::Aborted { step: CycleStep::SwappingHaio, .. }),
        "{outcome:?}"
    );
    assert!(h.ledger.writes().contains(&LedgerCall::Invoke {
        method: methods::SWAP_FOR_REWARD.into(),
        amount: Some(1_000_000),
    }));

    let op = s.operator.pubkey();
    assert_eq!(h.balance(&s.payment.mint, &op), 100_000_000);
    assert_eq!(h.balance(&s.revenue.mint, &op), 900_000);
}

#[tokio::test]
async fn payment_swap_failure_bypasses_payment_and_continues() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    h.ledger
        .inject_fault(Fault::Invoke(methods::SWAP_FOR_PAYMENT.into()));

    let outcome = h.orch.run_cycle_once().await;
    assert!(matches!(outcome, CycleOutcome::CompletedWithErrors { .. }));

    let writes = h.ledger.writes();
    assert!(!writes.iter().any(|c| matches!(
        c,
        LedgerCall::Transfer { to, .. } if *to == h.settings.payment_destination
    )));
    // Payment budget was never spent, so the full balance is swapped.
    assert!(writes.contains(&LedgerCall::Invoke {
        method: methods::SWAP_FOR_REWARD.into(),
        amount: Some(1_000_000),
    }));
    assert!(invoked(&writes, methods::DISTRIBUTE));
    assert!(h.messages().iter().any(|m| m.starts_with("Payment skipped")));
}

#[tokio::test]
async fn balance_query_failure_is_fatal() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    h.ledger
        .inject_fault(Fault::Balance(h.settings.revenue.mint.clone()));

    let outcome = h.orch.run_cycle_once().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Aborted { step: CycleStep::CheckingBalance, .. }
    ));
    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Error);
    assert_eq!(status.current_step, Some(CycleStep::CheckingBalance));
    assert!(h.ledger.writes().is_empty());
}

#[tokio::test]
async fn zero_ratios_skip_payment_and_burn() {
    let h = Harness::new(DemoParams {
        burn_ratio_bps: 0,
        payment_ratio_bps: 0,
        ..DemoParams::default()
    });
    h.give_revenue(1_000_000);

    assert_eq!(h.orch.run_cycle_once().await, CycleOutcome::Completed);
    let writes = h.ledger.writes();
    assert!(!invoked(&writes, methods::SWAP_FOR_PAYMENT));
    assert!(!writes.iter().any(|c| matches!(c, LedgerCall::Burn { .. })));
    assert!(writes.contains(&LedgerCall::Transfer {
        mint: h.settings.reward.mint.clone(),
        from: h.settings.operator.pubkey(),
        to: h.settings.revenue_safe.clone(),
        amount: 50_000_000_000,
    }));
    assert!(h
        .messages()
        .iter()
        .any(|m| m.contains("Burn amount is zero")));
}

#[tokio::test]
async fn next_cycle_starts_from_a_clean_error_state() {
    let h = Harness::new(DemoParams::default());
    h.give_revenue(1_000_000);
    h.ledger.inject_fault(Fault::Burn);
    h.orch.run_cycle_once().await;
    assert_eq!(h.store.get_status().unwrap().status, AgentStatus::Error);

    h.ledger.clear_faults();
    h.give_revenue(600_000);
    assert_eq!(h.orch.run_cycle_once().await, CycleOutcome::Completed);
    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Idle);
    assert_eq!(status.last_error, None);
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

/// Parks the first program invocation until released.
struct GatedLedger {
    inner: Arc<SimulatedLedger>,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Ledger for GatedLedger {
    async fn get_balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError> {
        self.inner.get_balance(mint, owner).await
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Confirmation, LedgerError> {
        self.inner.transfer(request).await
    }

    async fn burn(&self, request: BurnRequest) -> Result<Confirmation, LedgerError> {
        self.inner.burn(request).await
    }

    async fn invoke_program(&self, call: ProgramCall) -> Result<Confirmation, LedgerError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.invoke_program(call).await
    }

    async fn fetch_engine_state(&self, engine: &Address) -> Result<EngineState, LedgerError> {
        self.inner.fetch_engine_state(engine).await
    }
}

#[tokio::test]
async fn concurrent_trigger_is_a_no_op() {
    let params = DemoParams::default();
    let settings = demo::settings(&params);
    let sim = Arc::new(demo::ledger(&settings, &params));
    let gated = Arc::new(GatedLedger {
        inner: sim.clone(),
        armed: AtomicBool::new(true),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let h = Harness::with_ledger(settings, sim, gated.clone());
    h.give_revenue(1_000_000);

    let first = tokio::spawn({
        let orch = h.orch.clone();
        async move { orch.run_cycle_once().await }
    });
    gated.entered.notified().await;
    assert!(h.orch.is_running());

    let logs_before = h.store.log_count().unwrap();
    let status_before = h.store.get_status().unwrap();
    let calls_before = h.ledger.journal().len();

    assert_eq!(h.orch.run_cycle_once().await, CycleOutcome::AlreadyRunning);

    assert_eq!(h.store.log_count().unwrap(), logs_before);
    assert_eq!(h.store.get_status().unwrap(), status_before);
    assert_eq!(h.ledger.journal().len(), calls_before);
    assert_eq!(status_before.current_step, Some(CycleStep::SwappingAth));

    gated.release.notify_one();
    assert_eq!(first.await.unwrap(), CycleOutcome::Completed);
    assert!(!h.orch.is_running());
}

/// Panics on the first balance read, then behaves like the wrapped ledger.
struct PanicOnceLedger {
    inner: Arc<SimulatedLedger>,
    armed: AtomicBool,
}

#[async_trait]
impl Ledger for PanicOnceLedger {
    async fn get_balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("ledger client bug");
        }
        self.inner.get_balance(mint, owner).await
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Confirmation, LedgerError> {
        self.inner.transfer(request).await
    }

    async fn burn(&self, request: BurnRequest) -> Result<Confirmation, LedgerError> {
        self.inner.burn(request).await
    }

    async fn invoke_program(&self, call: ProgramCall) -> Result<Confirmation, LedgerError> {
        self.inner.invoke_program(call).await
    }

    async fn fetch_engine_state(&self, engine: &Address) -> Result<EngineState, LedgerError> {
        self.inner.fetch_engine_state(engine).await
    }
}

#[tokio::test]
async fn panicking_cycle_is_recorded_as_a_critical_abort() {
    let params = DemoParams::default();
    let settings = demo::settings(&params);
    let sim = Arc::new(demo::ledger(&settings, &params));
    let ledger = Arc::new(PanicOnceLedger {
        inner: sim.clone(),
        armed: AtomicBool::new(true),
    });
    let h = Harness::with_ledger(settings, sim, ledger);
    h.give_revenue(1_000_000);

    let outcome = h.orch.run_cycle_once().await;
    match &outcome {
        CycleOutcome::Aborted { step, error } => {
            assert_eq!(*step, CycleStep::CheckingBalance);
            assert!(error.contains("ledger client bug"), "{error}");
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(!h.orch.is_running());

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Error);
    assert_eq!(status.current_step, Some(CycleStep::CheckingBalance));
    assert!(status.last_error.unwrap().contains("ledger client bug"));
    assert!(h
        .messages()
        .iter()
        .any(|m| m.starts_with("Critical error in agent cycle")));

    assert_eq!(h.orch.run_cycle_once().await, CycleOutcome::Completed);
    assert_eq!(h.store.get_status().unwrap().status, AgentStatus::Idle);
}

// ---------------------------------------------------------------------------
// Funding and startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn funding_moves_revenue_from_admin_to_operator() {
    let h = Harness::new(DemoParams::default());
    let s = &h.settings;

    let confirmation = h.orch.fund_operating_account(2_500_000).await.unwrap();
    assert_eq!(h.balance(&s.revenue.mint, &s.operator.pubkey()), 2_500_000);
    assert_eq!(
        h.balance(&s.revenue.mint, &s.admin.pubkey()),
        demo::ADMIN_REVENUE_FLOAT - 2_500_000
    );

    let logs = h.store.recent_logs(2).unwrap();
    assert_eq!(logs[0].severity, Severity::Success);
    assert_eq!(logs[0].reference.as_deref(), Some(confirmation.signature.as_str()));
    assert_eq!(logs[1].severity, Severity::Process);
    assert!(logs[1].message.contains("2.5 USDC"));
    assert_eq!(h.store.get_status().unwrap().balances["USDC"], "2.5");
}

#[tokio::test]
async fn funding_rejects_zero_and_reports_ledger_errors() {
    let h = Harness::new(DemoParams::default());
    assert!(matches!(
        h.orch.fund_operating_account(0).await,
        Err(AgentError::InvalidAmount(_))
    ));
    assert_eq!(h.store.log_count().unwrap(), 0);

    let err = h
        .orch
        .fund_operating_account(demo::ADMIN_REVENUE_FLOAT + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Ledger(LedgerError::Program { .. })));
    assert_eq!(h.store.recent_logs(1).unwrap()[0].severity, Severity::Error);
}

#[tokio::test]
async fn startup_marks_an_interrupted_cycle_as_failed() {
    let h = Harness::new(DemoParams::default());
    h.store
        .upsert_status(
            StatusPatch::default()
                .status(AgentStatus::Processing)
                .step(Some(CycleStep::Burning)),
        )
        .unwrap();

    h.orch.startup().await.unwrap();

    let status = h.store.get_status().unwrap();
    assert_eq!(status.status, AgentStatus::Error);
    assert_eq!(status.current_step, Some(CycleStep::Burning));
    assert!(status.last_error.unwrap().contains("interrupted"));
    assert!(h.messages()[0].starts_with("Agent worker started"));
}
