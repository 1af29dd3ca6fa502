//! Per-chunk progress snapshots for observers.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::aggregate::AggregateRepairReport;
use crate::types::LogEntry;

/// What happened to the chunk that triggered a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Merged,
    Skipped,
    Fatal,
}

/// State of a run as of its most recent chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub iteration: u32,
    /// Unknown until the backend reports how many items it inspected.
    pub estimated_total_iterations: Option<u32>,
    pub chunk_status: ChunkStatus,
    /// Cursor the next chunk will be requested with.
    pub next_cursor: u64,
    pub total_attempted: u64,
    pub total_successful: u64,
    pub total_failed: u64,
    pub success_rate: f64,
    pub log_tail: Vec<LogEntry>,
}

impl ProgressSnapshot {
    pub fn capture(
        run_id: &str,
        iteration: u32,
        estimated_total_iterations: Option<u32>,
        chunk_status: ChunkStatus,
        next_cursor: u64,
        aggregate: &AggregateRepairReport,
        log_tail_len: usize,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            iteration,
            estimated_total_iterations,
            chunk_status,
            next_cursor,
            total_attempted: aggregate.total_attempted(),
            total_successful: aggregate.total_successful(),
            total_failed: aggregate.total_failed(),
            success_rate: aggregate.success_rate(),
            log_tail: aggregate.log_tail(log_tail_len).to_vec(),
        }
    }

    /// "3/7" when the total is known, "3" otherwise.
    pub fn position(&self) -> String {
        match self.estimated_total_iterations {
            Some(total) => format!("{}/{}", self.iteration, total),
            None => self.iteration.to_string(),
        }
    }
}

/// `ceil(items_inspected / budget)`, never below one.
pub fn estimate_total_iterations(items_inspected: u64, max_items_per_call: u32) -> Option<u32> {
    if max_items_per_call == 0 {
        return None;
    }
    let chunks = items_inspected.div_ceil(u64::from(max_items_per_call)).max(1);
    Some(u32::try_from(chunks).unwrap_or(u32::MAX))
}

/// Receives one snapshot per issued chunk.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn report(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Writes each snapshot to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        info!(
            run_id = %snapshot.run_id,
            status = ?snapshot.chunk_status,
            "Chunk {}: attempted={} successful={} failed={} next_cursor={}",
            snapshot.position(),
            snapshot.total_attempted,
            snapshot.total_successful,
            snapshot.total_failed,
            snapshot.next_cursor
        );
    }
}

/// Publishes the latest snapshot for any number of readers.
#[derive(Debug, Clone)]
pub struct WatchReporter(pub watch::Sender<Option<ProgressSnapshot>>);

impl ProgressReporter for WatchReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        self.0.send_replace(Some(snapshot.clone()));
    }
}
