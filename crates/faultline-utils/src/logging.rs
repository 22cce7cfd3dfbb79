//! # Logging Utilities
//!
//! Logging setup for faultline hosts, built on `tracing`.
//!
//! The capture engine logs install, teardown and configuration problems
//! through `tracing` macros. It never logs from inside the signal handler,
//! so whatever subscriber is configured here only sees events from normal
//! execution.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline_utils::init_logging;
//!
//! // Reads RUST_LOG, FAULTLINE_LOG_FORMAT and FAULTLINE_LOG_FILE
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Crash handler starting");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=faultline_core=debug`)
//! - `FAULTLINE_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `FAULTLINE_LOG_FILE`: optional log file, rotated daily, in addition to stderr
//!
//! Console output goes to stderr so command output on stdout stays clean.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Keeps the file writer's background thread alive for the whole process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable output (default)
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    /// Default
    Info,
    Debug,
    /// Most verbose
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Initialize logging from the environment.
///
/// - `RUST_LOG`: filter, default `info`
/// - `FAULTLINE_LOG_FORMAT`: output format, default `pretty`
/// - `FAULTLINE_LOG_FILE`: optional log file
///
/// ## Errors
///
/// Returns an error if:
/// - `FAULTLINE_LOG_FORMAT` names an unknown format
/// - a global subscriber is already installed
/// - the log file directory cannot be created
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = match env::var("FAULTLINE_LOG_FORMAT") {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::Pretty,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    init_subscriber(format, filter, log_file_from_env())
}

/// Initialize logging with an explicit level and format.
///
/// The level overrides `RUST_LOG`; `FAULTLINE_LOG_FILE` is still honoured.
///
/// ```rust,no_run
/// use faultline_utils::{init_logging_with_level, LogFormat, LogLevel};
///
/// init_logging_with_level(LogLevel::Debug, LogFormat::Json).expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    let filter = EnvFilter::new(Level::from(level).to_string());
    init_subscriber(format, filter, log_file_from_env())
}

fn log_file_from_env() -> Option<PathBuf>
{
    env::var_os("FAULTLINE_LOG_FILE")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Split a log file path into the directory and file-name prefix `tracing-appender` wants.
fn appender_location(path: &Path) -> (PathBuf, PathBuf)
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map_or_else(|| PathBuf::from("faultline.log"), PathBuf::from);
    (directory, file_name)
}

fn init_subscriber(format: LogFormat, filter: EnvFilter, log_file: Option<PathBuf>) -> Result<(), LoggingError>
{
    let file_writer = match log_file {
        Some(path) => {
            let (directory, file_name) = appender_location(&path);
            std::fs::create_dir_all(&directory)?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, file_name));
            if FILE_GUARD.set(guard).is_err() {
                return Err(LoggingError::InitializationFailed(
                    "a log file writer is already running".to_string(),
                ));
            }
            Some(writer)
        }
        None => None,
    };

    let result = match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(filter.clone());
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_filter(filter)
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_writer(io::stderr)
                .with_filter(filter.clone());
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_filter(filter)
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };

    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Unknown `FAULTLINE_LOG_FORMAT` value
    #[error("Invalid log format: {0} (use 'pretty' or 'json')")]
    InvalidFormat(String),

    /// Unknown log level name
    #[error("Invalid log level: {0} (use 'error', 'warn', 'info', 'debug' or 'trace')")]
    InvalidLevel(String),

    /// A subscriber or file writer was already set up
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// Log file directory could not be created
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
