//! Deterministic stand-in for the repair backend.
//!
//! Used by this crate's tests and by downstream crates' tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

use crate::client::{InvokeError, RepairTransport};
use crate::recording::CorrelationId;
use crate::types::{ChunkReport, ProcessingStats, RepairChunkRequest, RepairChunkResponse};

pub type ScriptedResult = Result<RepairChunkResponse, InvokeError>;
type Fallback = Box<dyn Fn(&RepairChunkRequest) -> ScriptedResult + Send + Sync>;

/// Replays a fixed list of results, one per call, and records every request.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedResult>>,
    fallback: Option<Fallback>,
    gate: Option<Arc<Semaphore>>,
    requests: Mutex<Vec<RepairChunkRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptedResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            gate: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `f` once the script runs out.
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&RepairChunkRequest) -> ScriptedResult + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Each call consumes one permit from `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<RepairChunkRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cursors of the requests seen so far.
    pub fn cursors(&self) -> Vec<u64> {
        self.requests().iter().map(|r| r.resume_cursor).collect()
    }
}

#[async_trait]
impl RepairTransport for ScriptedTransport {
    async fn invoke_repair(
        &self,
        _correlation_id: &CorrelationId,
        request: &RepairChunkRequest,
    ) -> Result<RepairChunkResponse, InvokeError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(fallback)) => fallback(request),
            (None, None) => Err(InvokeError::Decode("script exhausted".to_string())),
        }
    }
}

/// A successful chunk repairing `successful + failed` items.
pub fn ok_chunk(
    successful: u64,
    failed: u64,
    has_more: bool,
    next_cursor: u64,
) -> RepairChunkResponse {
    RepairChunkResponse {
        success: true,
        report: Some(ChunkReport {
            attempted: successful.saturating_add(failed),
            successful,
            failed,
            details: Vec::new(),
            errors: Vec::new(),
            has_more,
            next_cursor,
            processing_stats: None,
        }),
        structured_logs: None,
        plain_logs: None,
        error: None,
    }
}

/// Same as [`ok_chunk`] with inspection stats attached.
pub fn ok_chunk_with_stats(
    successful: u64,
    has_more: bool,
    next_cursor: u64,
    items_inspected: u64,
) -> RepairChunkResponse {
    let mut response = ok_chunk(successful, 0, has_more, next_cursor);
    if let Some(report) = response.report.as_mut() {
        report.processing_stats = Some(ProcessingStats { items_inspected });
    }
    response
}

/// `success: false` with a domain error.
pub fn rejected(message: &str) -> RepairChunkResponse {
    RepairChunkResponse {
        success: false,
        report: None,
        structured_logs: None,
        plain_logs: None,
        error: Some(message.to_string()),
    }
}
