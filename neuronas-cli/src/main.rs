use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use neuronas_core::{
    render_summary, ChunkDriver, ChunkStatus, Config, FunctionsClient, IssueType,
    ProgressSnapshot, RecordingLogger, RepairJob, RepairRunReport, RunState,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::Level;

/// Drive NEURONAS backend repairs from a terminal
#[derive(Parser, Debug)]
#[command(name = "neuronas")]
#[command(about = "Chunked repair driver for the NEURONAS backend", long_about = None)]
struct Cli {
    /// Include debug-level driver logs on stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a chunked auto-repair until the backend reports no more work
    Repair(RepairArgs),
    /// Print a human-readable summary of a saved run report
    Summary(SummaryArgs),
}

#[derive(Parser, Debug)]
struct RepairArgs {
    /// Issue category to repair, or "all"
    #[arg(long, default_value = IssueType::ALL)]
    issue_type: String,

    /// Restrict the repair to these records (repeatable)
    #[arg(long = "issue-id")]
    issue_ids: Vec<String>,

    /// Cursor to start from, e.g. the final cursor of a capped run
    #[arg(long, default_value_t = 0)]
    start_cursor: u64,

    /// Backend base URL (if not provided, will use NEURONAS_API_URL environment variable)
    #[arg(long)]
    api_url: Option<String>,

    /// Backend API key (if not provided, will use NEURONAS_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Items repaired per call
    #[arg(long)]
    max_items_per_call: Option<u32>,

    /// Maximum chunk requests for this run
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Pause between chunks in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Record function traffic to this JSONL file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Write the final report JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    /// Report JSON produced by `neuronas repair`
    report: PathBuf,
}

impl RepairArgs {
    /// Flag values that take precedence over the environment.
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(v) = value {
                pairs.push((key, v));
            }
        };
        push("NEURONAS_API_URL", self.api_url.clone());
        push("NEURONAS_API_KEY", self.api_key.clone());
        push(
            "REPAIR_MAX_ITEMS_PER_CALL",
            self.max_items_per_call.map(|v| v.to_string()),
        );
        push(
            "REPAIR_MAX_ITERATIONS",
            self.max_iterations.map(|v| v.to_string()),
        );
        push("REPAIR_CHUNK_DELAY_MS", self.delay_ms.map(|v| v.to_string()));
        push(
            "REQUEST_TIMEOUT_SECS",
            self.timeout_secs.map(|v| v.to_string()),
        );
        if let Some(path) = &self.record {
            push("RECORDING_ENABLED", Some("true".to_string()));
            push("RECORDING_LOG_PATH", Some(path.display().to_string()));
        }
        pairs
    }

    fn load_config(&self) -> Result<Config> {
        let overrides = self.overrides();
        Config::from_lookup(|key| {
            overrides
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .or_else(|| env::var(key).ok())
        })
    }
}

fn print_progress(snapshot: &ProgressSnapshot) {
    let marker = match snapshot.chunk_status {
        ChunkStatus::Merged => "ok",
        ChunkStatus::Skipped => "skipped",
        ChunkStatus::Fatal => "fatal",
    };
    eprintln!(
        "[chunk {}] {}: attempted={} successful={} failed={} next_cursor={}",
        snapshot.position(),
        marker,
        snapshot.total_attempted,
        snapshot.total_successful,
        snapshot.total_failed,
        snapshot.next_cursor
    );
    if snapshot.chunk_status != ChunkStatus::Merged {
        if let Some(entry) = snapshot.log_tail.last() {
            eprintln!("  {} {}", entry.level, entry.message);
        }
    }
}

async fn run_repair(args: RepairArgs) -> Result<()> {
    let config = args.load_config()?;

    let recording_logger = if config.recording_enabled {
        Some(
            RecordingLogger::new(config.recording_log_path.clone())
                .context("Failed to start recording logger")?,
        )
    } else {
        None
    };

    let client = FunctionsClient::new_with_recording(
        config.api_url.clone(),
        config.api_key.clone(),
        config.request_timeout,
        recording_logger.clone(),
    )
    .context("Failed to create HTTP client")?
    .with_function_name(config.function_name.clone());

    let driver = ChunkDriver::new(client, config.driver.clone());
    let job = RepairJob::new(args.issue_type.as_str(), args.issue_ids.clone())
        .starting_at(args.start_cursor);

    let report = driver.run_chunked_repair(job, &print_progress).await?;

    if let Some(logger) = &recording_logger {
        logger.flush().await;
    }

    eprint!("{}", render_summary(&report));
    if report.status == RunState::Capped {
        eprintln!(
            "Iteration cap reached; continue with --start-cursor {}",
            report.final_cursor
        );
    }

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => println!("{}", json),
    }

    if report.status == RunState::Failed {
        return Err(anyhow!("Repair run {} failed", report.run_id));
    }

    Ok(())
}

fn run_summary(args: SummaryArgs) -> Result<()> {
    let content = fs::read_to_string(&args.report)
        .with_context(|| format!("Failed to read {}", args.report.display()))?;
    let report: RepairRunReport =
        serde_json::from_str(&content).context("Failed to parse run report")?;
    print!("{}", render_summary(&report));
    Ok(())
}

fn log_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level(cli.verbose))
        .init();

    match cli.command {
        Commands::Repair(args) => run_repair(args).await,
        Commands::Summary(args) => run_summary(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn logs_at_info_unless_verbose() {
        assert_eq!(log_level(false), Level::INFO);
        assert_eq!(log_level(true), Level::DEBUG);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "neuronas",
            "repair",
            "--api-url",
            "https://backend.test",
            "--issue-id",
            "bench-1",
            "--issue-id",
            "bench-2",
            "--max-iterations",
            "3",
            "--delay-ms",
            "0",
            "--record",
            "out/rec.jsonl",
        ]);
        let Commands::Repair(args) = cli.command else {
            panic!("expected repair subcommand");
        };
        assert_eq!(args.issue_type, "all");
        assert_eq!(args.issue_ids, vec!["bench-1", "bench-2"]);

        let config = args.load_config().unwrap();
        assert_eq!(config.api_url, "https://backend.test");
        assert_eq!(config.driver.max_iterations, 3);
        assert_eq!(config.driver.inter_chunk_delay, std::time::Duration::ZERO);
        assert!(config.recording_enabled);
        assert_eq!(config.recording_log_path, PathBuf::from("out/rec.jsonl"));
    }
}
