use axum::extract::State;
use axum::Json;
use haio_core::status::OrchestratorStatus;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/agent-status
pub async fn get_agent_status(
    State(app): State<AppState>,
) -> Result<Json<OrchestratorStatus>, AppError> {
    let store = app.store();
    let status = tokio::task::spawn_blocking(move || store.get_status()).await??;
    Ok(Json(status))
}
