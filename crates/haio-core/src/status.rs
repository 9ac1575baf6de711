//! Operator-visible state of the agent: the singleton status row and the
//! append-only activity log.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AgentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    #[default]
    Idle,
    Processing,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Processing => "PROCESSING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// CycleStep
// ---------------------------------------------------------------------------

/// Position of the orchestrator inside one cycle.
///
/// Steps run strictly in declaration order; see
/// [`crate::orchestrator::step`] for how step outcomes pick the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStep {
    CheckingBalance,
    SwappingAth,
    PayingAth,
    SwappingHaio,
    Burning,
    Transferring,
    Distributing,
    Done,
}

impl CycleStep {
    /// The step that follows in the linear sequence, `None` after `Done`.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::CheckingBalance => Some(Self::SwappingAth),
            Self::SwappingAth => Some(Self::PayingAth),
            Self::PayingAth => Some(Self::SwappingHaio),
            Self::SwappingHaio => Some(Self::Burning),
            Self::Burning => Some(Self::Transferring),
            Self::Transferring => Some(Self::Distributing),
            Self::Distributing => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckingBalance => "CHECKING_BALANCE",
            Self::SwappingAth => "SWAPPING_ATH",
            Self::PayingAth => "PAYING_ATH",
            Self::SwappingHaio => "SWAPPING_HAIO",
            Self::Burning => "BURNING",
            Self::Transferring => "TRANSFERRING",
            Self::Distributing => "DISTRIBUTING",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrchestratorStatus / StatusPatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub status: AgentStatus,
    pub current_step: Option<CycleStep>,
    /// Asset symbol → human decimal balance of the operating account.
    pub balances: BTreeMap<String, String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for OrchestratorStatus {
    fn default() -> Self {
        Self {
            status: AgentStatus::Idle,
            current_step: None,
            balances: BTreeMap::new(),
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Partial update of [`OrchestratorStatus`].
///
/// `None` leaves a field untouched; for nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPatch {
    pub status: Option<AgentStatus>,
    pub current_step: Option<Option<CycleStep>>,
    pub balances: Option<BTreeMap<String, String>>,
    pub last_error: Option<Option<String>>,
}

impl StatusPatch {
    pub fn status(mut self, status: AgentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn step(mut self, step: Option<CycleStep>) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn balances(mut self, balances: BTreeMap<String, String>) -> Self {
        self.balances = Some(balances);
        self
    }

    pub fn last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply onto `status`, bumping `updated_at` when anything changed.
    pub fn apply(self, status: &mut OrchestratorStatus, now: DateTime<Utc>) {
        if self.is_empty() {
            return;
        }
        if let Some(s) = self.status {
            status.status = s;
        }
        if let Some(step) = self.current_step {
            status.current_step = step;
        }
        if let Some(balances) = self.balances {
            // Merge so a partial refresh does not drop other assets.
            status.balances.extend(balances);
        }
        if let Some(err) = self.last_error {
            status.last_error = err;
        }
        status.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Process,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
    /// Transaction signature the entry refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}
