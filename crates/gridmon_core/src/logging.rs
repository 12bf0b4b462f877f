//! Structured logging setup with stderr and optional file output.
//!
//! Provides:
//! - Stderr output, so stdout carries only the report
//! - Optional daily rotating log files when a log directory is configured
//! - Build-type conditional log levels
//! - A directive for the cluster client derived from its configured level
//! - Environment variable override via GRIDMON_LOG or RUST_LOG

use crate::models::LogLevel;

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable naming a directory for rotating log files.
pub const LOG_DIR_ENV: &str = "GRIDMON_LOG_DIR";

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files; stderr only when `None`
    pub log_dir: Option<PathBuf>,
    /// Whether stderr is a terminal (enables ANSI colours)
    pub is_tty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
    /// Level for the cluster client module
    pub client_level: LogLevel,
    /// File name prefix for rotated logs
    pub file_prefix: String,
}

impl LogConfig {
    /// Create a new logging configuration for the named program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            log_dir: std::env::var_os(LOG_DIR_ENV).map(PathBuf::from),
            is_tty: atty::is(atty::Stream::Stderr),
            log_filter: None,
            client_level: LogLevel::default(),
            file_prefix: program.into(),
        }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Set the cluster client's log level.
    pub fn with_client_level(mut self, level: LogLevel) -> Self {
        self.client_level = level;
        self
    }
}

/// Guard that must be held for the lifetime of the program.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If file logging initialization fails, falls back to stderr only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.log_dir.is_none() {
        return init_stderr_logging(&config);
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using stderr only.");
            init_stderr_logging(&config)
        }
    }
}

fn init_stderr_logging(config: &LogConfig) -> LoggingGuard {
    let env_filter = build_env_filter(config.log_filter.as_deref(), config.client_level);

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .with_ansi(config.is_tty)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let log_dir = config.log_dir.as_ref().ok_or("no log directory configured")?;
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr = std::io::stderr.with_max_level(tracing::Level::INFO);
    let combined = stderr.and(non_blocking);

    let env_filter = build_env_filter(config.log_filter.as_deref(), config.client_level);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Ok(guard)
}

/// Build the environment filter from config or defaults.
///
/// Priority: custom filter > GRIDMON_LOG > RUST_LOG > default. The client
/// directive is appended only to the default, so an explicit filter always
/// has the last word.
fn build_env_filter(custom_filter: Option<&str>, client_level: LogLevel) -> EnvFilter {
    let fallback = || EnvFilter::new(filter_with_client_level(client_level));

    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| fallback());
    }

    EnvFilter::try_from_env("GRIDMON_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| fallback())
}

/// The default filter with the client module's directive appended.
pub fn filter_with_client_level(client_level: LogLevel) -> String {
    format!("{},gridmon_core::client={}", default_log_filter(), client_level.as_directive())
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,gridmon=trace,gridmon_core=trace,actix_web=info,hyper=warn,reqwest=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,gridmon=info,gridmon_core=info,actix_web=info,hyper=warn,reqwest=warn"
    }
}
