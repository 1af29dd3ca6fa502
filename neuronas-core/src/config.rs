use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_ITEMS_PER_CALL: u32 = 20;
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_LOG_TAIL: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Knobs of the chunk loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Items the backend may repair per call; also the skip distance after a network fault.
    pub max_items_per_call: u32,
    /// Safety cap on chunk requests per run.
    pub max_iterations: u32,
    /// Pause between chunks so the backend is not hammered.
    pub inter_chunk_delay: Duration,
    /// Log entries carried in each progress snapshot.
    pub log_tail_len: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_items_per_call: DEFAULT_MAX_ITEMS_PER_CALL,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            inter_chunk_delay: DEFAULT_CHUNK_DELAY,
            log_tail_len: DEFAULT_LOG_TAIL,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_items_per_call == 0 {
            bail!("max_items_per_call must be greater than zero");
        }
        if self.max_iterations == 0 {
            bail!("max_iterations must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub function_name: String,
    pub request_timeout: Duration,
    pub driver: DriverConfig,
    pub recording_enabled: bool,
    pub recording_log_path: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("NEURONAS_API_URL")
            .filter(|s| !s.trim().is_empty())
            .context("NEURONAS_API_URL environment variable is required")?;

        let api_key = lookup("NEURONAS_API_KEY").filter(|s| !s.trim().is_empty());

        let function_name = lookup("REPAIR_FUNCTION_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| crate::types::REPAIR_FUNCTION.to_string());

        let driver = DriverConfig {
            max_items_per_call: parse_or(
                &lookup,
                "REPAIR_MAX_ITEMS_PER_CALL",
                DEFAULT_MAX_ITEMS_PER_CALL,
            )?,
            max_iterations: parse_or(&lookup, "REPAIR_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS)?,
            inter_chunk_delay: Duration::from_millis(parse_or(
                &lookup,
                "REPAIR_CHUNK_DELAY_MS",
                DEFAULT_CHUNK_DELAY.as_millis() as u64,
            )?),
            log_tail_len: parse_or(&lookup, "REPAIR_LOG_TAIL", DEFAULT_LOG_TAIL)?,
        };
        driver.validate()?;

        let request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?);

        let recording_enabled = lookup("RECORDING_ENABLED")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let recording_log_path = lookup("RECORDING_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("recordings.jsonl"));

        let port = parse_or(&lookup, "PORT", 3000u16)?;

        Ok(Config {
            api_url,
            api_key,
            function_name,
            request_timeout,
            driver,
            recording_enabled,
            recording_log_path,
            port,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid number, got {:?}", key, raw)),
        _ => Ok(default),
    }
}
