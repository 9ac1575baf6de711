pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use haio_core::Orchestrator;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Dashboard polling
        .route("/api/agent-status", get(routes::status::get_agent_status))
        .route("/api/agent-logs", get(routes::logs::get_agent_logs))
        .route("/api/engine-state", get(routes::engine::get_engine_state))
        .route("/api/claimable", get(routes::engine::get_claimable))
        // Triggers
        .route(
            "/api/simulate-and-run",
            post(routes::trigger::simulate_and_run),
        )
        .route("/api/run-cycle", post(routes::trigger::run_cycle))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Run a cycle every `period`. The first tick fires immediately; ticks
/// missed while a cycle runs are skipped rather than bunched up.
pub fn spawn_cycle_timer(orchestrator: Arc<Orchestrator>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let outcome = orchestrator.run_cycle_once().await;
            tracing::debug!(?outcome, "scheduled cycle finished");
        }
    })
}

/// Start the status API on a pre-bound listener.
///
/// Taking the listener lets the caller bind port 0 and read the actual port
/// before serving.
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let app = build_router(app_state);
    tracing::info!("agent API listening on http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the status API on `0.0.0.0:port`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}
