use axum::extract::{Query, State};
use axum::Json;
use haio_core::amount::format_default;
use haio_core::ledger::EngineState;
use haio_core::reward::{claimable, PRECISION};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/engine-state
pub async fn get_engine_state(
    State(app): State<AppState>,
) -> Result<Json<EngineState>, AppError> {
    Ok(Json(app.orchestrator.engine_snapshot().await?))
}

#[derive(Debug, Deserialize)]
pub struct ClaimableQuery {
    pub staked_units: u64,
    /// Decimal string; checkpoints are 128-bit.
    #[serde(default)]
    pub reward_debt: Option<String>,
}

/// GET /api/claimable?staked_units=N&reward_debt=D
pub async fn get_claimable(
    State(app): State<AppState>,
    Query(query): Query<ClaimableQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let debt: u128 = match query.reward_debt.as_deref() {
        None | Some("") => 0,
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::bad_request(format!("invalid reward_debt '{raw}'")))?,
    };
    let engine = app.orchestrator.engine_snapshot().await?;
    let cumulative = engine.rewards.cumulative_reward_per_unit;
    let amount = claimable(cumulative, debt, query.staked_units, PRECISION);
    let reward = &app.orchestrator.settings().reward;

    Ok(Json(serde_json::json!({
        "cumulative_reward_per_unit": cumulative.to_string(),
        "reward_debt": debt.to_string(),
        "staked_units": query.staked_units,
        "claimable": amount.to_string(),
        "claimable_formatted": format_default(amount, reward.decimals),
        "symbol": reward.symbol,
    })))
}
