pub mod aggregate;
pub mod client;
pub mod config;
pub mod driver;
pub mod fault;
pub mod progress;
pub mod recording;
pub mod summary;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use aggregate::{AggregateRepairReport, CountOverflow, RunVerdict};
pub use client::{FunctionsClient, InvokeError, RepairTransport};
pub use config::{Config, DriverConfig};
pub use driver::{ChunkDriver, DriverError, RepairJob, RepairRunReport, RunClaim, RunState};
pub use fault::{classify, ChunkFailure, FaultClass};
pub use progress::{
    ChunkStatus, ProgressReporter, ProgressSnapshot, TracingReporter, WatchReporter,
};
pub use recording::{
    CorrelationId, RecordingLogger, RecordingMiddleware, CORRELATION_ID_HEADER,
};
pub use summary::render_summary;
pub use types::*;
