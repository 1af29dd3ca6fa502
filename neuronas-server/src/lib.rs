pub mod repairs;

use neuronas_core::{
    ChunkDriver, DriverConfig, ProgressSnapshot, RecordingLogger, RepairRunReport,
    RepairTransport, WatchReporter,
};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

pub use repairs::repairs_router;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_version() -> String {
    // Packaged builds export the hash explicitly
    if let Some(git_hash) = option_env!("NEURONAS_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        short_hash(git_hash)
    } else {
        built_info::PKG_VERSION.to_string()
    }
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub type SharedTransport = Arc<dyn RepairTransport>;

pub struct AppState {
    pub driver: ChunkDriver<SharedTransport>,
    /// Latest snapshot of the current or most recent run.
    pub progress: WatchReporter,
    pub last_report: RwLock<Option<RepairRunReport>>,
    pub recording_logger: Option<RecordingLogger>,
}

impl AppState {
    pub fn new(
        transport: SharedTransport,
        config: DriverConfig,
        recording_logger: Option<RecordingLogger>,
    ) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            driver: ChunkDriver::new(transport, config),
            progress: WatchReporter(sender),
            last_report: RwLock::new(None),
            recording_logger,
        }
    }

    pub fn latest_progress(&self) -> Option<ProgressSnapshot> {
        self.progress.0.borrow().clone()
    }
}
