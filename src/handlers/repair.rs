//! # Repair Handlers
//!
//! Triggers a bounded-concurrency repair batch over a scope of stored
//! connections and returns the structured per-connection report.

use axum::{extract::State, response::Json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ApiError, ConnectError};
use crate::reconciler::RepairReport;
use crate::server::AppState;
use crate::store::RepairScope;

/// Runs a repair batch. Tokens nearing expiry are refreshed first, then
/// the scope's active connections are re-fetched; each connection succeeds
/// or fails independently.
pub async fn run_repair(
    State(state): State<AppState>,
    Json(scope): Json<RepairScope>,
) -> Result<Json<RepairReport>, ApiError> {
    info!(?scope, "repair batch requested");

    // Freshness pass: refresh what can be refreshed so the fetches below
    // run against live tokens. A failed refresh is left for the batch to
    // report as a fetch failure.
    let targets = state
        .store
        .list_scope(&scope)
        .await
        .map_err(ConnectError::from)?;
    for connection in targets {
        let id = connection.id;
        if let Err(err) = state.lifecycle.ensure_fresh(connection).await {
            warn!(connection_id = %id, error = %err, "token refresh failed ahead of repair");
        }
    }

    // Batches are bounded by the configured deadline: once it passes, no
    // new fetch starts and the report carries the rest as cancelled.
    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    let deadline_secs = state.config.repair_deadline_secs;
    let timer = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(deadline_secs)).await;
        warn!(deadline_secs, "repair deadline passed, cancelling the batch");
        deadline.cancel();
    });

    let report = state.reconciler.repair(scope, cancel).await?;
    timer.abort();
    info!(
        repaired = report.repaired(),
        failed = report.failed(),
        total = report.outcomes.len(),
        "repair batch finished"
    );
    Ok(Json(report))
}
