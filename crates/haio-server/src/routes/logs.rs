use axum::extract::{Query, State};
use axum::Json;
use haio_core::status::LogEntry;
use haio_core::store::MAX_LOG_ENTRIES;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub const DEFAULT_LOG_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// GET /api/agent-logs?limit=N, newest first.
pub async fn get_agent_logs(
    State(app): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(MAX_LOG_ENTRIES as usize);
    let store = app.store();
    let logs = tokio::task::spawn_blocking(move || store.recent_logs(limit)).await??;
    Ok(Json(logs))
}
