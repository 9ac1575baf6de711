use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use haio_core::ledger::LedgerError;
use haio_core::AgentError;

/// Carries an explicit 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequest(String);

impl std::fmt::Display for BadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequest {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequest(msg.into()).into())
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
        LedgerError::Rpc(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Program { .. } | LedgerError::Rejected(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequest>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<AgentError>() {
            match e {
                AgentError::InvalidAmount(_) | AgentError::Amount(_) => StatusCode::BAD_REQUEST,
                AgentError::Ledger(le) => ledger_status(le),
                AgentError::MissingConfig(_)
                | AgentError::InvalidConfig { .. }
                | AgentError::Keypair { .. }
                | AgentError::StatusDb(_)
                | AgentError::Reward(_)
                | AgentError::Io(_)
                | AgentError::Yaml(_)
                | AgentError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(le) = self.0.downcast_ref::<LedgerError>() {
            ledger_status(le)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
