//! Routes for starting and watching repair runs.
//!
//! At most one run is active per process; a second `POST /repairs` while one
//! is running is answered with `409 Conflict`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use neuronas_core::{render_summary, ProgressSnapshot, RepairJob, RepairRunReport, RunState};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CurrentRun {
    pub state: RunState,
    pub progress: Option<ProgressSnapshot>,
    pub last_report: Option<RepairRunReport>,
}

pub fn repairs_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/repairs", post(start_repair))
        .route("/repairs/current", get(current_repair))
        .with_state(state)
}

async fn start_repair(State(state): State<Arc<AppState>>, Json(job): Json<RepairJob>) -> Response {
    let claim = match state.driver.try_claim() {
        Ok(claim) => claim,
        Err(e) => {
            warn!("Rejected repair request for {}: {}", job.issue_type, e);
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": e.to_string(),
                    "state": state.driver.state(),
                })),
            )
                .into_response();
        }
    };

    info!(
        "Starting repair run for issue type {} at cursor {}",
        job.issue_type, job.start_cursor
    );
    let accepted = json!({
        "state": RunState::Running,
        "issue_type": job.issue_type,
        "issue_ids": job.issue_ids,
        "start_cursor": job.start_cursor,
    });

    state.progress.0.send_replace(None);
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let report = task_state
            .driver
            .drive(&claim, job, &task_state.progress)
            .await;

        if let Some(logger) = &task_state.recording_logger {
            logger.flush().await;
        }

        info!("{}", render_summary(&report).trim_end());

        // Readers see the terminal state only together with its report.
        let mut last_report = task_state.last_report.write().await;
        claim.release(&report);
        *last_report = Some(report);
    });

    (StatusCode::ACCEPTED, Json(accepted)).into_response()
}

async fn current_repair(State(state): State<Arc<AppState>>) -> Json<CurrentRun> {
    // A run is released only under the write lock, so a terminal state read
    // here always belongs to `last_report` and to the progress read before it.
    let last_report = state.last_report.read().await;
    let progress = state.latest_progress();
    Json(CurrentRun {
        state: state.driver.state(),
        progress,
        last_report: last_report.clone(),
    })
}
