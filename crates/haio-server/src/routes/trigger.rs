use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    /// Revenue base units to fund; the configured default when absent.
    #[serde(default, alias = "amountLamports")]
    pub amount: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub success: bool,
    pub message: String,
    pub transfer_tx_id: String,
}

/// Run one cycle in the background. The guard makes this a no-op while a
/// cycle is already in flight.
fn spawn_cycle(app: &AppState) {
    let orchestrator = app.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.run_cycle_once().await;
    });
}

/// POST /api/simulate-and-run: fund the operating account from the admin
/// account, then start a cycle without waiting for it.
pub async fn simulate_and_run(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<SimulateResponse>, AppError> {
    let request: SimulateRequest = if body.is_empty() {
        SimulateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("invalid request body: {e}")))?
    };
    let amount = request.amount.unwrap_or(app.default_simulate_amount);
    if amount == 0 {
        return Err(AppError::bad_request("amount must be a positive integer"));
    }

    let confirmation = app.orchestrator.fund_operating_account(amount).await?;
    info!(amount, signature = %confirmation.signature, "revenue simulated, starting cycle");
    spawn_cycle(&app);

    let revenue = &app.orchestrator.settings().revenue;
    Ok(Json(SimulateResponse {
        success: true,
        message: format!(
            "Funded {} {}; agent cycle started.",
            haio_core::amount::format_default(amount as u128, revenue.decimals),
            revenue.symbol
        ),
        transfer_tx_id: confirmation.signature,
    }))
}

/// POST /api/run-cycle: start a cycle without funding.
pub async fn run_cycle(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let already_running = app.orchestrator.is_running();
    spawn_cycle(&app);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "accepted": !already_running,
            "already_running": already_running,
        })),
    )
}
