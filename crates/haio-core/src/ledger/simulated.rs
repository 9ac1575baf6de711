//! In-memory ledger with the mock swap program and the distribution engine.
//!
//! Token accounts are keyed by `(mint, owner)`. Every call is appended to a
//! bounded journal before it executes, and faults can be armed per operation
//! so that failure paths of the orchestrator can be exercised deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::{
    methods, Address, BurnRequest, Confirmation, EngineState, Ledger, LedgerError, ProgramCall,
    TransferRequest,
};
use crate::reward::{DistributionRatios, HolderStakeRecord, RewardLedgerState};

/// Program error codes reported by the simulated programs.
const ERR_INSUFFICIENT_FUNDS: i64 = 1;
const ERR_INSUFFICIENT_LIQUIDITY: i64 = 6001;
const ERR_UNKNOWN_METHOD: i64 = 6100;
const ERR_BAD_ARGS: i64 = 6101;
const ERR_CALCULATION: i64 = 6002;

/// Oldest journal entries are dropped past this many calls.
pub const JOURNAL_CAPACITY: usize = 4096;

/// A mock swap route: `amount_in` of `input_mint` buys
/// `amount_in * rate * 10^output_decimals / 10^input_decimals` of `output_mint`.
#[derive(Debug, Clone)]
pub struct SwapRoute {
    pub input_mint: Address,
    pub output_mint: Address,
    pub rate: u64,
    pub input_decimals: u32,
    pub output_decimals: u32,
}

impl SwapRoute {
    fn quote(&self, amount_in: u64) -> Option<u64> {
        let out_scale = 10u128.checked_pow(self.output_decimals)?;
        let in_scale = 10u128.checked_pow(self.input_decimals)?;
        let out = (amount_in as u128)
            .checked_mul(self.rate as u128)?
            .checked_mul(out_scale)?
            .checked_div(in_scale)?;
        u64::try_from(out).ok()
    }
}

/// One journaled ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerCall {
    Balance {
        mint: Address,
        owner: Address,
    },
    Transfer {
        mint: Address,
        from: Address,
        to: Address,
        amount: u64,
    },
    Burn {
        mint: Address,
        owner: Address,
        amount: u64,
    },
    Invoke {
        method: String,
        amount: Option<u64>,
    },
    EngineState,
}

impl LedgerCall {
    /// True for calls that would submit a transaction.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Transfer { .. } | Self::Burn { .. } | Self::Invoke { .. })
    }
}

/// An operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Balance reads for this mint fail with a transport error.
    Balance(Address),
    /// Transfers into this owner fail.
    TransferTo(Address),
    Burn,
    /// Program invocations of this method fail.
    Invoke(String),
}

#[derive(Debug, Clone)]
struct SimEngine {
    address: Address,
    reward_mint: Address,
    state: EngineState,
}

#[derive(Debug, Default)]
struct SimState {
    accounts: HashMap<(Address, Address), u64>,
    routes: HashMap<String, SwapRoute>,
    engine: Option<SimEngine>,
    stakes: HashMap<Address, HolderStakeRecord>,
    journal: VecDeque<LedgerCall>,
    faults: HashSet<Fault>,
    tx_counter: u64,
}

impl SimState {
    fn record(&mut self, call: LedgerCall) {
        if self.journal.len() == JOURNAL_CAPACITY {
            self.journal.pop_front();
        }
        self.journal.push_back(call);
    }

    fn next_signature(&mut self, kind: &str) -> Confirmation {
        self.tx_counter += 1;
        Confirmation {
            signature: format!("sim-{kind}-{:06}", self.tx_counter),
        }
    }

    fn check_fault(&self, fault: &Fault) -> Result<(), LedgerError> {
        if self.faults.contains(fault) {
            return Err(LedgerError::Rpc(format!("injected fault: {fault:?}")));
        }
        Ok(())
    }

    fn balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError> {
        self.accounts
            .get(&(mint.clone(), owner.clone()))
            .copied()
            .ok_or_else(|| LedgerError::AccountNotFound(format!("{owner} ({mint})")))
    }

    fn debit(&mut self, mint: &Address, owner: &Address, amount: u64) -> Result<(), LedgerError> {
        let have = self.balance(mint, owner)?;
        if have < amount {
            return Err(LedgerError::Program {
                code: ERR_INSUFFICIENT_FUNDS,
                message: format!("insufficient funds: {owner} has {have}, needs {amount}"),
            });
        }
        self.accounts
            .insert((mint.clone(), owner.clone()), have - amount);
        Ok(())
    }

    fn credit(&mut self, mint: &Address, owner: &Address, amount: u64) -> Result<(), LedgerError> {
        let have = self.balance(mint, owner)?;
        let next = have.checked_add(amount).ok_or(LedgerError::Program {
            code: ERR_CALCULATION,
            message: "balance overflow".into(),
        })?;
        self.accounts.insert((mint.clone(), owner.clone()), next);
        Ok(())
    }

    fn move_tokens(
        &mut self,
        mint: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        // Both accounts must exist before anything moves.
        self.balance(mint, to)?;
        self.debit(mint, from, amount)?;
        self.credit(mint, to, amount)
    }
}

#[derive(Debug, Default)]
pub struct SimulatedLedger {
    inner: Mutex<SimState>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or overwrite) a token account.
    pub fn set_balance(&self, mint: &Address, owner: &Address, amount: u64) {
        self.lock()
            .accounts
            .insert((mint.clone(), owner.clone()), amount);
    }

    pub fn balance_of(&self, mint: &Address, owner: &Address) -> Option<u64> {
        self.lock().balance(mint, owner).ok()
    }

    pub fn add_swap_route(&self, method: impl Into<String>, route: SwapRoute) {
        self.lock().routes.insert(method.into(), route);
    }

    /// Install the distribution engine at `address`, creating empty pool
    /// accounts for `reward_mint` where missing.
    pub fn install_engine(
        &self,
        address: &Address,
        reward_mint: &Address,
        pools: EnginePools,
        ratios: DistributionRatios,
    ) {
        let mut state = self.lock();
        for owner in [
            &pools.revenue_safe,
            &pools.reward_pool,
            &pools.dao_treasury,
            &pools.developer_treasury,
        ] {
            state
                .accounts
                .entry((reward_mint.clone(), owner.clone()))
                .or_insert(0);
        }
        state.engine = Some(SimEngine {
            address: address.clone(),
            reward_mint: reward_mint.clone(),
            state: EngineState {
                revenue_safe: pools.revenue_safe,
                reward_pool: pools.reward_pool,
                dao_treasury: pools.dao_treasury,
                developer_treasury: pools.developer_treasury,
                ratios,
                rewards: RewardLedgerState::default(),
            },
        });
    }

    /// Stake `units` for `holder` against the installed engine.
    pub fn stake(&self, holder: &Address, units: u64) -> Result<HolderStakeRecord, LedgerError> {
        let mut state = self.lock();
        let engine = state
            .engine
            .as_mut()
            .ok_or_else(|| LedgerError::AccountNotFound("distribution engine".into()))?;
        let record = HolderStakeRecord::stake(&mut engine.state.rewards, units).map_err(|e| {
            LedgerError::Program {
                code: ERR_CALCULATION,
                message: e.to_string(),
            }
        })?;
        state.stakes.insert(holder.clone(), record.clone());
        Ok(record)
    }

    pub fn stake_record(&self, holder: &Address) -> Option<HolderStakeRecord> {
        self.lock().stakes.get(holder).cloned()
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn journal(&self) -> Vec<LedgerCall> {
        self.lock().journal.iter().cloned().collect()
    }

    pub fn writes(&self) -> Vec<LedgerCall> {
        self.lock()
            .journal
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn swap(state: &mut SimState, call: &ProgramCall) -> Result<Confirmation, LedgerError> {
        let route = state
            .routes
            .get(&call.method)
            .cloned()
            .ok_or_else(|| unknown_method(&call.method))?;
        let amount_in = amount_arg(call)?;
        let operator = required_account(call, "operator")?;
        let input_vault = required_account(call, "input_vault")?;
        let output_vault = required_account(call, "output_vault")?;
        require_signer(call, operator)?;

        if amount_in == 0 {
            return Err(LedgerError::Program {
                code: ERR_BAD_ARGS,
                message: "zero amount".into(),
            });
        }
        let amount_out = route.quote(amount_in).ok_or(LedgerError::Program {
            code: ERR_CALCULATION,
            message: "swap output overflow".into(),
        })?;
        if state.balance(&route.output_mint, output_vault)? < amount_out {
            return Err(LedgerError::Program {
                code: ERR_INSUFFICIENT_LIQUIDITY,
                message: "insufficient liquidity".into(),
            });
        }
        // Output account must exist before the input leaves.
        state.balance(&route.output_mint, operator)?;
        state.move_tokens(&route.input_mint, operator, input_vault, amount_in)?;
        state.move_tokens(&route.output_mint, output_vault, operator, amount_out)?;
        debug!(method = %call.method, amount_in, amount_out, "simulated swap");
        Ok(state.next_signature("swap"))
    }

    fn distribute(state: &mut SimState, call: &ProgramCall) -> Result<Confirmation, LedgerError> {
        let mut engine = state
            .engine
            .clone()
            .ok_or_else(|| LedgerError::AccountNotFound("distribution engine".into()))?;
        let engine_account = required_account(call, "engine_state")?;
        if engine_account != &engine.address {
            return Err(LedgerError::Rejected(format!(
                "engine state mismatch: {engine_account}"
            )));
        }
        let safe = &engine.state.revenue_safe;
        if required_account(call, "revenue_safe")? != safe {
            return Err(LedgerError::Rejected("revenue safe mismatch".into()));
        }

        let mint = engine.reward_mint.clone();
        let revenue = state.balance(&mint, safe)?;
        if revenue > 0 {
            let split = engine.state.ratios.split(revenue);
            let safe = safe.clone();
            state.move_tokens(&mint, &safe, &engine.state.reward_pool, split.staker)?;
            state.move_tokens(&mint, &safe, &engine.state.dao_treasury, split.dao)?;
            state.move_tokens(
                &mint,
                &safe,
                &engine.state.developer_treasury,
                split.developer,
            )?;
            engine
                .state
                .rewards
                .accrue(split.staker, Utc::now())
                .map_err(|e| LedgerError::Program {
                    code: ERR_CALCULATION,
                    message: e.to_string(),
                })?;
            debug!(revenue, staker = split.staker, "simulated distribution");
        }
        state.engine = Some(engine);
        Ok(state.next_signature("distribute"))
    }
}

/// Pool accounts of the distribution engine.
#[derive(Debug, Clone)]
pub struct EnginePools {
    pub revenue_safe: Address,
    pub reward_pool: Address,
    pub dao_treasury: Address,
    pub developer_treasury: Address,
}

fn unknown_method(method: &str) -> LedgerError {
    LedgerError::Program {
        code: ERR_UNKNOWN_METHOD,
        message: format!("unknown method {method}"),
    }
}

fn amount_arg(call: &ProgramCall) -> Result<u64, LedgerError> {
    call.args
        .get("amount_in")
        .and_then(|v| v.as_u64())
        .ok_or(LedgerError::Program {
            code: ERR_BAD_ARGS,
            message: "missing amount_in".into(),
        })
}

fn required_account<'a>(call: &'a ProgramCall, name: &str) -> Result<&'a Address, LedgerError> {
    call.account(name)
        .ok_or_else(|| LedgerError::Rejected(format!("missing account '{name}'")))
}

fn require_signer(call: &ProgramCall, who: &Address) -> Result<(), LedgerError> {
    if call.signers.iter().any(|k| &k.pubkey() == who) {
        Ok(())
    } else {
        Err(LedgerError::Rejected(format!("missing signature of {who}")))
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn get_balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError> {
        let mut state = self.lock();
        state.record(LedgerCall::Balance {
            mint: mint.clone(),
            owner: owner.clone(),
        });
        state.check_fault(&Fault::Balance(mint.clone()))?;
        state.balance(mint, owner)
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Confirmation, LedgerError> {
        let mut state = self.lock();
        state.record(LedgerCall::Transfer {
            mint: request.mint.clone(),
            from: request.from.clone(),
            to: request.to.clone(),
            amount: request.amount,
        });
        state.check_fault(&Fault::TransferTo(request.to.clone()))?;
        if request.authority.pubkey() != request.from {
            return Err(LedgerError::Rejected(format!(
                "{} is not the owner of the source account",
                request.authority.pubkey()
            )));
        }
        state.move_tokens(&request.mint, &request.from, &request.to, request.amount)?;
        Ok(state.next_signature("transfer"))
    }

    async fn burn(&self, request: BurnRequest) -> Result<Confirmation, LedgerError> {
        let mut state = self.lock();
        state.record(LedgerCall::Burn {
            mint: request.mint.clone(),
            owner: request.owner.clone(),
            amount: request.amount,
        });
        state.check_fault(&Fault::Burn)?;
        if request.authority.pubkey() != request.owner {
            return Err(LedgerError::Rejected("burn authority is not the owner".into()));
        }
        state.debit(&request.mint, &request.owner, request.amount)?;
        Ok(state.next_signature("burn"))
    }

    async fn invoke_program(&self, call: ProgramCall) -> Result<Confirmation, LedgerError> {
        let mut state = self.lock();
        state.record(LedgerCall::Invoke {
            method: call.method.clone(),
            amount: call.args.get("amount_in").and_then(|v| v.as_u64()),
        });
        state.check_fault(&Fault::Invoke(call.method.clone()))?;
        if call.method == methods::DISTRIBUTE {
            Self::distribute(&mut state, &call)
        } else {
            Self::swap(&mut state, &call)
        }
    }

    async fn fetch_engine_state(&self, engine: &Address) -> Result<EngineState, LedgerError> {
        let mut state = self.lock();
        state.record(LedgerCall::EngineState);
        match &state.engine {
            Some(e) if &e.address == engine => Ok(e.state.clone()),
            _ => Err(LedgerError::AccountNotFound(format!("engine state {engine}"))),
        }
    }
}
