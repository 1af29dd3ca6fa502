//! Sequential chunk loop for the remote repair function.
//!
//! A run issues one `autoRepairService` call at a time, each carrying the
//! cursor the previous call handed back, until the backend reports no more
//! work, the iteration cap is reached, or a fatal fault occurs:
//!
//! ```text
//! Idle -> Running -> { Completed | Capped | Failed }
//! ```
//!
//! A new run may start from `Idle` or any terminal state. Starting one while
//! another is `Running` is rejected with [`DriverError::AlreadyRunning`].

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::aggregate::{AggregateRepairReport, RunVerdict};
use crate::client::RepairTransport;
use crate::config::DriverConfig;
use crate::fault::{classify, ChunkFailure, FaultClass};
use crate::progress::{
    estimate_total_iterations, ChunkStatus, ProgressReporter, ProgressSnapshot,
};
use crate::recording::CorrelationId;
use crate::types::{
    ChunkReport, IssueType, LogEntry, LogLevel, RepairChunkRequest, RepairChunkResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Running,
    /// Backend reported no more work.
    Completed,
    /// Iteration cap reached with work possibly remaining.
    Capped,
    /// A fatal fault stopped the run.
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Capped | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Capped => "CAPPED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("a repair run is already in progress")]
    AlreadyRunning,
}

/// What to repair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairJob {
    #[serde(default)]
    pub issue_type: IssueType,
    /// Empty means unscoped.
    #[serde(default)]
    pub issue_ids: Vec<String>,
    /// Where the first chunk starts; non-zero when continuing a capped run.
    #[serde(default)]
    pub start_cursor: u64,
}

impl RepairJob {
    pub fn new(issue_type: impl Into<IssueType>, issue_ids: Vec<String>) -> Self {
        Self {
            issue_type: issue_type.into(),
            issue_ids,
            start_cursor: 0,
        }
    }

    pub fn starting_at(mut self, cursor: u64) -> Self {
        self.start_cursor = cursor;
        self
    }
}

/// Final, immutable account of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRunReport {
    pub run_id: String,
    pub issue_type: IssueType,
    pub status: RunState,
    pub start_cursor: u64,
    /// Cursor a follow-up run should start from.
    pub final_cursor: u64,
    pub estimated_total_iterations: Option<u32>,
    pub started_at: String,
    pub finished_at: String,
    pub aggregate: AggregateRepairReport,
}

impl RepairRunReport {
    pub fn verdict(&self) -> RunVerdict {
        self.aggregate.verdict()
    }

    pub fn iterations(&self) -> u32 {
        self.aggregate.iterations()
    }
}

/// Exclusive right to perform one run on a [`ChunkDriver`].
///
/// Dropping a claim before the run finishes (e.g. the task was aborted)
/// leaves the driver `Failed` rather than stuck `Running`.
#[must_use = "a claim blocks other runs until it is used or dropped"]
pub struct RunClaim {
    state: Arc<Mutex<RunState>>,
    finished: bool,
}

impl RunClaim {
    /// Move the driver to the report's terminal status and end the claim.
    pub fn release(self, report: &RepairRunReport) {
        self.finish(report.status);
    }

    fn finish(mut self, terminal: RunState) {
        set_state(&self.state, terminal);
        self.finished = true;
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        if !self.finished {
            set_state(&self.state, RunState::Failed);
        }
    }
}

fn set_state(state: &Mutex<RunState>, value: RunState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

pub struct ChunkDriver<T> {
    transport: T,
    config: DriverConfig,
    state: Arc<Mutex<RunState>>,
}

impl<T: RepairTransport> ChunkDriver<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            transport,
            config,
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `Running` if no run is in progress.
    pub fn try_claim(&self) -> Result<RunClaim, DriverError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == RunState::Running {
            return Err(DriverError::AlreadyRunning);
        }
        *state = RunState::Running;
        Ok(RunClaim {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }

    /// Drive a repair to a terminal state.
    ///
    /// Chunk-level faults never surface as `Err`; they are reflected in the
    /// returned report's status and `all_errors`.
    pub async fn run_chunked_repair(
        &self,
        job: RepairJob,
        reporter: &dyn ProgressReporter,
    ) -> Result<RepairRunReport, DriverError> {
        let claim = self.try_claim()?;
        Ok(self.run_claimed(claim, job, reporter).await)
    }

    /// Run with a claim obtained earlier from [`ChunkDriver::try_claim`].
    pub async fn run_claimed(
        &self,
        claim: RunClaim,
        job: RepairJob,
        reporter: &dyn ProgressReporter,
    ) -> RepairRunReport {
        let report = self.drive(&claim, job, reporter).await;
        claim.release(&report);
        report
    }

    /// Run to a terminal status without releasing `claim`.
    ///
    /// The driver stays `Running` until the caller passes the report to
    /// [`RunClaim::release`], so the report can be published first.
    pub async fn drive(
        &self,
        claim: &RunClaim,
        job: RepairJob,
        reporter: &dyn ProgressReporter,
    ) -> RepairRunReport {
        debug_assert!(Arc::ptr_eq(&claim.state, &self.state));

        let run_id = CorrelationId::generate();
        let started_at = chrono::Utc::now().to_rfc3339();
        let budget = self.config.max_items_per_call;
        let mut aggregate = AggregateRepairReport::new();
        let mut cursor = job.start_cursor;
        let mut estimate: Option<u32> = None;
        let mut iteration: u32 = 0;

        info!(
            run_id = %run_id,
            "Starting repair run: issue_type={} ids={} start_cursor={} budget={} cap={}",
            job.issue_type,
            job.issue_ids.len(),
            cursor,
            budget,
            self.config.max_iterations
        );

        let status = loop {
            iteration += 1;
            if iteration > self.config.max_iterations {
                warn!(
                    run_id = %run_id,
                    "Iteration cap of {} reached; work may remain from cursor {}",
                    self.config.max_iterations, cursor
                );
                aggregate.push_log(
                    LogEntry::now(
                        LogLevel::Warning,
                        format!(
                            "Stopped after {} chunks; resume from cursor {}",
                            self.config.max_iterations, cursor
                        ),
                    )
                    .with_details(json!({ "next_cursor": cursor })),
                );
                break RunState::Capped;
            }
            aggregate.set_iterations(iteration);

            let request = RepairChunkRequest {
                issue_type: job.issue_type.clone(),
                issue_ids: job.issue_ids.clone(),
                max_items_per_call: budget,
                resume_cursor: cursor,
            };

            let outcome = match self.transport.invoke_repair(&run_id, &request).await {
                Ok(response) => into_chunk(response).and_then(|(report, structured, plain)| {
                    let position = ChunkPosition::of(&report);
                    aggregate.merge(report, structured, plain)?;
                    Ok(position)
                }),
                Err(e) => Err(ChunkFailure::from(e)),
            };

            match outcome {
                Ok(position) => {
                    if let Some(items) = position.items_inspected {
                        estimate = estimate_total_iterations(items, budget);
                    }
                    if position.next_cursor < cursor {
                        warn!(
                            run_id = %run_id,
                            "Chunk {} returned next_skip {} behind cursor {}; keeping cursor",
                            iteration, position.next_cursor, cursor
                        );
                    } else {
                        cursor = position.next_cursor;
                    }
                    let has_more = position.has_more;
                    self.emit(
                        reporter,
                        &run_id,
                        iteration,
                        estimate,
                        ChunkStatus::Merged,
                        cursor,
                        &aggregate,
                    );

                    if !has_more {
                        break RunState::Completed;
                    }
                }
                Err(failure) => match classify(&failure) {
                    FaultClass::RetryableSkip => {
                        let skipped_from = cursor;
                        cursor = cursor.saturating_add(u64::from(budget));
                        warn!(
                            run_id = %run_id,
                            "Chunk {} hit a network fault, skipping {}..{}: {}",
                            iteration, skipped_from, cursor, failure
                        );
                        aggregate.push_log(
                            LogEntry::now(
                                LogLevel::Warning,
                                format!(
                                    "Network error on chunk {}; skipped to cursor {}: {}",
                                    iteration, cursor, failure
                                ),
                            )
                            .with_details(json!({
                                "iteration": iteration,
                                "skipped_from": skipped_from,
                                "next_cursor": cursor,
                            })),
                        );
                        self.emit(
                            reporter,
                            &run_id,
                            iteration,
                            estimate,
                            ChunkStatus::Skipped,
                            cursor,
                            &aggregate,
                        );
                    }
                    FaultClass::Fatal => {
                        let message = failure.to_string();
                        error!(
                            run_id = %run_id,
                            "Chunk {} failed fatally: {}", iteration, message
                        );
                        aggregate.record_fatal(iteration, &message);
                        aggregate.push_log(
                            LogEntry::now(
                                LogLevel::Error,
                                format!("Repair aborted on chunk {}: {}", iteration, message),
                            )
                            .with_details(json!({ "iteration": iteration })),
                        );
                        self.emit(
                            reporter,
                            &run_id,
                            iteration,
                            estimate,
                            ChunkStatus::Fatal,
                            cursor,
                            &aggregate,
                        );
                        break RunState::Failed;
                    }
                },
            }

            if iteration < self.config.max_iterations && !self.config.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.config.inter_chunk_delay).await;
            }
        };

        info!(
            run_id = %run_id,
            "Repair run {}: {} chunks, {} attempted, {} successful, {} failed",
            status,
            aggregate.iterations(),
            aggregate.total_attempted(),
            aggregate.total_successful(),
            aggregate.total_failed()
        );

        RepairRunReport {
            run_id: run_id.0,
            issue_type: job.issue_type,
            status,
            start_cursor: job.start_cursor,
            final_cursor: cursor,
            estimated_total_iterations: estimate,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            aggregate,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        reporter: &dyn ProgressReporter,
        run_id: &CorrelationId,
        iteration: u32,
        estimate: Option<u32>,
        status: ChunkStatus,
        cursor: u64,
        aggregate: &AggregateRepairReport,
    ) {
        let snapshot = ProgressSnapshot::capture(
            &run_id.0,
            iteration,
            estimate,
            status,
            cursor,
            aggregate,
            self.config.log_tail_len,
        );
        reporter.report(&snapshot);
    }
}

type MergeableChunk = (ChunkReport, Option<Vec<LogEntry>>, Option<Vec<String>>);

/// Where a merged chunk leaves the run.
struct ChunkPosition {
    next_cursor: u64,
    has_more: bool,
    items_inspected: Option<u64>,
}

impl ChunkPosition {
    fn of(report: &ChunkReport) -> Self {
        Self {
            next_cursor: report.next_cursor,
            has_more: report.has_more,
            items_inspected: report.processing_stats.map(|s| s.items_inspected),
        }
    }
}

fn into_chunk(response: RepairChunkResponse) -> Result<MergeableChunk, ChunkFailure> {
    if !response.success {
        return Err(ChunkFailure::Rejected {
            message: response.error,
        });
    }
    let report = response.report.ok_or(ChunkFailure::MissingReport)?;
    Ok((report, response.structured_logs, response.plain_logs))
}

#[cfg(test)]
mod scenarios;
