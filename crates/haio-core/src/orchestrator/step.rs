//! Step results and the cycle's transition function.
//!
//! Each step reports a [`StepOutcome`]; [`CycleStep::next`] turns the pair
//! into the next move of the driving loop:
//!
//! ```text
//! CHECKING_BALANCE ─┬─ below threshold ──────────────────────────▶ finish (IDLE)
//!                   └▶ SWAPPING_ATH ─┬─ completed ─▶ PAYING_ATH ─┐
//!                                    └─ otherwise: PAYING_ATH bypassed
//!                                                                ▼
//!                      SWAPPING_HAIO (fatal on failure) ─▶ BURNING ─▶ TRANSFERRING
//!                                            ┌─ completed ─▶ DISTRIBUTING ─┐
//!                      TRANSFERRING ─────────┴─ otherwise: DISTRIBUTING bypassed
//!                                                                          ▼
//!                                                                        DONE
//! ```
//!
//! A `Fatal` outcome aborts from any step.

use crate::status::CycleStep;

use super::CycleError;

#[derive(Debug, Clone)]
pub enum StepOutcome {
    Completed,
    /// Nothing to do; the reason goes to the activity log.
    Skipped(String),
    /// Failed, the cycle goes on and ends in ERROR.
    Recoverable(CycleError),
    /// Failed, the cycle stops here.
    Fatal(CycleError),
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Advance(CycleStep),
    /// Record `step` as skipped without running it, then continue with its
    /// successor.
    Bypass(CycleStep),
    Finish,
    Abort,
}

impl CycleStep {
    pub fn next(self, outcome: &StepOutcome) -> Transition {
        if matches!(outcome, StepOutcome::Fatal(_)) {
            return Transition::Abort;
        }
        match self {
            Self::CheckingBalance if outcome.is_completed() => Transition::Advance(Self::SwappingAth),
            Self::CheckingBalance => Transition::Finish,
            Self::SwappingAth if outcome.is_completed() => Transition::Advance(Self::PayingAth),
            Self::SwappingAth => Transition::Bypass(Self::PayingAth),
            Self::Transferring if outcome.is_completed() => {
                Transition::Advance(Self::Distributing)
            }
            Self::Transferring => Transition::Bypass(Self::Distributing),
            Self::Done => Transition::Finish,
            other => match other.successor() {
                Some(step) => Transition::Advance(step),
                None => Transition::Finish,
            },
        }
    }
}
