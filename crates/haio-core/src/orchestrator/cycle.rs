//! One run of the cycle: the driving loop and the body of every step.

use tracing::debug;

use crate::ledger::{methods, BurnRequest, TransferRequest};
use crate::reward::apply_bps;
use crate::status::{AgentStatus, CycleStep, Severity, StatusPatch};

use super::step::{StepOutcome, Transition};
use super::{CycleError, CycleOutcome, Orchestrator};

pub(super) struct CycleRun<'a> {
    orch: &'a Orchestrator,
    /// Revenue balance as of the threshold check, decremented after a
    /// confirmed payment (by the payment budget) and after the reward swap.
    /// Only the threshold check reads it from the ledger.
    revenue_balance: u64,
    /// Revenue units allocated to the payment asset in this cycle.
    payment_budget: u64,
    last_error: Option<CycleError>,
}

impl<'a> CycleRun<'a> {
    pub(super) fn new(orch: &'a Orchestrator) -> Self {
        Self {
            orch,
            revenue_balance: 0,
            payment_budget: 0,
            last_error: None,
        }
    }

    pub(super) async fn drive(mut self) -> CycleOutcome {
        let mut step = CycleStep::CheckingBalance;
        // One write, so no reader sees PROCESSING next to the previous run's step.
        self.orch
            .patch(
                StatusPatch::default()
                    .status(AgentStatus::Processing)
                    .step(Some(step))
                    .last_error(None),
            )
            .await;

        loop {
            debug!(%step, "entering step");
            let outcome = self.execute(step).await;
            self.record(&outcome).await;

            step = match step.next(&outcome) {
                Transition::Advance(next) => next,
                Transition::Bypass(skipped) => {
                    self.orch
                        .patch(StatusPatch::default().step(Some(skipped)))
                        .await;
                    self.orch
                        .log(bypass_reason(skipped), Severity::Info, None)
                        .await;
                    match skipped.successor() {
                        Some(next) => next,
                        None => return self.finish(skipped).await,
                    }
                }
                Transition::Finish => return self.finish(step).await,
                Transition::Abort => {
                    let error = match outcome {
                        StepOutcome::Fatal(e) => e,
                        _ => CycleError::Critical(format!("cycle aborted during {step}")),
                    };
                    return self.orch.abort_cycle(step, error).await;
                }
            };
            self.orch
                .patch(StatusPatch::default().step(Some(step)))
                .await;
        }
    }

    async fn execute(&mut self, step: CycleStep) -> StepOutcome {
        match step {
            CycleStep::CheckingBalance => self.check_balance().await,
            CycleStep::SwappingAth => self.swap_for_payment().await,
            CycleStep::PayingAth => self.pay().await,
            CycleStep::SwappingHaio => self.swap_for_reward().await,
            CycleStep::Burning => self.burn().await,
            CycleStep::Transferring => self.transfer_to_safe().await,
            CycleStep::Distributing => self.distribute().await,
            CycleStep::Done => self.done().await,
        }
    }

    /// Log skips and failures; completed steps log their own success.
    async fn record(&mut self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Completed => {}
            StepOutcome::Skipped(reason) => {
                self.orch.log(reason.clone(), Severity::Info, None).await
            }
            StepOutcome::Recoverable(e) | StepOutcome::Fatal(e) => {
                self.orch.log(e.to_string(), Severity::Error, None).await;
                self.last_error = Some(e.clone());
            }
        }
    }

    async fn finish(self, step: CycleStep) -> CycleOutcome {
        if step != CycleStep::Done {
            // Below threshold: a normal no-op.
            self.orch.patch(
                StatusPatch::default()
                    .status(AgentStatus::Idle)
                    .step(None),
            )
            .await;
            return CycleOutcome::BelowThreshold {
                balance: self.revenue_balance,
                threshold: self.orch.settings().revenue_threshold,
            };
        }
        match self.last_error {
            Some(e) => {
                let message = e.to_string();
                self.orch.patch(
                    StatusPatch::default()
                        .status(AgentStatus::Error)
                        .step(Some(CycleStep::Done))
                        .last_error(Some(message.clone())),
                )
                .await;
                CycleOutcome::CompletedWithErrors {
                    last_error: message,
                }
            }
            None => {
                self.orch.patch(
                    StatusPatch::default()
                        .status(AgentStatus::Idle)
                        .step(None),
                )
                .await;
                CycleOutcome::Completed
            }
        }
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn check_balance(&mut self) -> StepOutcome {
        let s = self.orch.settings();
        let balance = match self.orch.balance_of(&s.revenue.mint).await {
            Ok(b) => b,
            Err(source) => {
                return StepOutcome::Fatal(CycleError::BalanceQuery {
                    asset: s.revenue.symbol.clone(),
                    source,
                })
            }
        };
        self.revenue_balance = balance;
        self.orch.refresh_balances_logged().await;

        let shown = self.orch.display(&s.revenue, balance);
        let threshold = self.orch.display(&s.revenue, s.revenue_threshold);
        if balance < s.revenue_threshold {
            return StepOutcome::Skipped(format!(
                "Revenue balance {shown} {sym} is below threshold {threshold} {sym}, nothing to do.",
                sym = s.revenue.symbol
            ));
        }
        self.orch.log(
            format!(
                "Agent cycle started: revenue balance {shown} {sym} meets threshold {threshold} {sym}.",
                sym = s.revenue.symbol
            ),
            Severity::Info,
            None,
        )
        .await;
        StepOutcome::Completed
    }

    async fn swap_for_payment(&mut self) -> StepOutcome {
        let s = self.orch.settings();
        self.payment_budget = apply_bps(self.revenue_balance, s.payment_ratio_bps);
        if self.payment_budget == 0 {
            return StepOutcome::Skipped(format!(
                "No {} allocated for the {} payment, skipping swap.",
                s.revenue.symbol, s.payment.symbol
            ));
        }
        self.orch.log(
            format!(
                "Swapping {} {} for {}...",
                self.orch.display(&s.revenue, self.payment_budget),
                s.revenue.symbol,
                s.payment.symbol
            ),
            Severity::Process,
            None,
        )
        .await;
        match self
            .orch
            .swap(
                methods::SWAP_FOR_PAYMENT,
                &s.payment,
                &s.swap_payment_vault,
                self.payment_budget,
            )
            .await
        {
            Ok(c) => {
                self.orch.log(
                    format!("{} swap successful.", s.payment.symbol),
                    Severity::Success,
                    Some(c.signature),
                )
                .await;
                self.orch.refresh_balances_logged().await;
                StepOutcome::Completed
            }
            Err(source) => StepOutcome::Recoverable(CycleError::SwapExecution {
                asset: s.payment.symbol.clone(),
                source,
            }),
        }
    }

    async fn pay(&mut self) -> StepOutcome {
        let s = self.orch.settings();
        let held = match self.orch.balance_of(&s.payment.mint).await {
            Ok(b) => b,
            Err(source) => {
                return StepOutcome::Fatal(CycleError::BalanceQuery {
                    asset: s.payment.symbol.clone(),
                    source,
                })
            }
        };
        if held == 0 {
            return StepOutcome::Skipped(format!(
                "No {} to send to the payment destination.",
                s.payment.symbol
            ));
        }
        self.orch.log(
            format!(
                "Sending {} {} to {}...",
                self.orch.display(&s.payment, held),
                s.payment.symbol,
                s.payment_destination
            ),
            Severity::Process,
            None,
        )
        .await;
        let request = TransferRequest {
            mint: s.payment.mint.clone(),
            from: s.operator.pubkey(),
            to: s.payment_destination.clone(),
            authority: s.operator.clone(),
            amount: held,
        };
        match self.orch.ledger().transfer(request).await {
            Ok(c) => {
                self.orch.log(
                    format!("{} payment sent.", s.payment.symbol),
                    Severity::Success,
                    Some(c.signature),
                )
                .await;
                match self.revenue_balance.checked_sub(self.payment_budget) {
                    Some(rest) => self.revenue_balance = rest,
                    None => {
                        return StepOutcome::Fatal(CycleError::Critical(
                            "payment budget exceeds the cached revenue balance".into(),
                        ))
                    }
                }
                self.orch.refresh_balances_logged().await;
                StepOutcome::Completed
            }
            Err(source) => StepOutcome::Recoverable(CycleError::TransferExecution {
                target: "payment destination".into(),
                source,
            }),
        }
    }

    async fn swap_for_reward(&mut self) -> StepOutcome {
        let s = self.orch.settings();
        let amount = self.revenue_balance;
        if amount == 0 {
            return StepOutcome::Skipped(format!(
                "No remaining {} to swap for {}.",
                s.revenue.symbol, s.reward.symbol
            ));
        }
        self.orch.log(
            format!(
                "Swapping remaining {} {} for {}...",
                self.orch.display(&s.revenue, amount),
                s.revenue.symbol,
                s.reward.symbol
            ),
            Severity::Process,
            None,
        )
        .await;
        match self
            .orch
            .swap(
                methods::SWAP_FOR_REWARD,
                &s.reward,
                &s.swap_reward_vault,
                amount,
            )
            .await
        {
            Ok(c) => {
                self.orch.log(
                    format!("{} swap successful.", s.reward.symbol),
                    Severity::Success,
                    Some(c.signature),
                )
                .await;
                self.revenue_balance = 0;
                self.orch.refresh_balances_logged().await;
                StepOutcome::Completed
            }
            // Every later step works from this balance.
            Err(source) => StepOutcome::Fatal(CycleError::SwapExecution {
                asset: s.reward.symbol.clone(),
                source,
            }),
        }
    }

    async fn burn(&mut self) -> StepOutcome {
        let s = self.orch.settings();
        let held = match self.orch.balance_of(&s.reward.mint).await {
            Ok(b) => b,
            Err(source) => {
                return StepOutcome::Fatal(CycleError::BalanceQuery {
                    asset: s.reward.symbol.clone(),
                    source,
                })
            }
        };
        if held == 0 {
            return StepOutcome::Skipped(format!(
                "{} balance is zero after swap, nothing to burn.",
                s.reward.symbol
            ));
        }
        let amount = apply_bps(held, s.burn_ratio_bps);
        if amount == 0 {
            return StepOutcome::Skipped("Burn amount is zero, skipping.".into());
        }
        self.orch.log(
            format!(
                "Burning {} of {} {}...",
                self.orch.display(&s.reward, amount),
                self.orch.display(&s.reward, held),
                s.reward.symbol
            ),
            Severity::Process,
            None,
        )
        .await;
        let request = BurnRequest {
            mint: s.reward.mint.clone(),
            owner: s.operator.pubkey(),
            authority: s.operator.clone(),
            amount,
        };
        match self.orch.ledger().burn(request).await {
            Ok(c) => {
                self.orch
                    .log("Burn successful.", Severity::Success, Some(c.signature))
                    .await;
                self.orch.refresh_balances_logged().await;
                StepOutcome::Completed
            }
            Err(source) => StepOutcome::Recoverable(CycleError::BurnExecution(source)),
        }
    }

    async fn transfer_to_safe(&mut self) -> StepOutcome {
        let s = self.orch.settings();
        // Authoritative re-read: the burn may or may not have landed.
        let held = match self.orch.balance_of(&s.reward.mint).await {
            Ok(b) => b,
            Err(source) => {
                return StepOutcome::Fatal(CycleError::BalanceQuery {
                    asset: s.reward.symbol.clone(),
                    source,
                })
            }
        };
        if held == 0 {
            return StepOutcome::Skipped(format!(
                "No remaining {} to transfer.",
                s.reward.symbol
            ));
        }
        self.orch.log(
            format!(
                "Transferring {} {} to the revenue safe...",
                self.orch.display(&s.reward, held),
                s.reward.symbol
            ),
            Severity::Process,
            None,
        )
        .await;
        let request = TransferRequest {
            mint: s.reward.mint.clone(),
            from: s.operator.pubkey(),
            to: s.revenue_safe.clone(),
            authority: s.operator.clone(),
            amount: held,
        };
        match self.orch.ledger().transfer(request).await {
            Ok(c) => {
                self.orch.log(
                    "Transfer to revenue safe successful.",
                    Severity::Success,
                    Some(c.signature),
                )
                .await;
                self.orch.refresh_balances_logged().await;
                StepOutcome::Completed
            }
            Err(source) => StepOutcome::Recoverable(CycleError::TransferExecution {
                target: "revenue safe".into(),
                source,
            }),
        }
    }

    async fn distribute(&mut self) -> StepOutcome {
        self.orch.log(
            "Triggering distribute_revenue...",
            Severity::Process,
            None,
        )
        .await;
        match self.orch.distribute().await {
            Ok(c) => {
                self.orch.log(
                    "distribute_revenue called successfully.",
                    Severity::Success,
                    Some(c.signature),
                )
                .await;
                StepOutcome::Completed
            }
            Err(source) => StepOutcome::Recoverable(CycleError::DistributionExecution(source)),
        }
    }

    async fn done(&mut self) -> StepOutcome {
        if self.last_error.is_some() {
            self.orch
                .log("Agent cycle finished with errors.", Severity::Error, None)
                .await;
        } else {
            self.orch
                .log("Agent cycle finished successfully.", Severity::Success, None)
                .await;
        }
        StepOutcome::Completed
    }
}

fn bypass_reason(step: CycleStep) -> &'static str {
    match step {
        CycleStep::PayingAth => "Payment skipped: no payment asset was acquired this cycle.",
        CycleStep::Distributing => {
            "Distribution skipped: the revenue safe transfer did not complete."
        }
        _ => "Step skipped.",
    }
}
