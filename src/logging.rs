/// Structured logging for the sensor import service
///
/// Every event carries the data source it concerns and, where relevant,
/// the station identifier. Output goes to the console and optionally to an
/// append-only log file. `RUST_LOG` overrides the configured level.

use crate::db::InsertFailure;
use crate::model::ImportError;
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(ImportError::config(format!("unknown log level '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Csv,
    Simulator,
    Database,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Csv => write!(f, "CSV"),
            DataSource::Simulator => write!(f, "SIM"),
            DataSource::Database => write!(f, "DB"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the document itself was rejected (bad value,
    /// missing timestamp, constraint violation)
    Expected,
    /// Unexpected failure - the datastore misbehaved
    Unexpected,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber: console on stderr plus an optional log
/// file. Call once, from the binary.
pub fn init_logger(min_level: LogLevel, log_file: Option<&Path>) -> Result<(), ImportError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aquamapper_service={}", min_level)));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ImportError::config(format!("cannot open log file {}: {}", path.display(), e))
                })?;
            Some(
                tracing_fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| ImportError::config(format!("logger already initialised: {}", e)))
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::info!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::warn!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::error!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, station_id: Option<&str>, message: &str) {
    tracing::debug!(source = %source, station = station_id.unwrap_or("-"), "{}", message);
}

fn log_at(level: LogLevel, source: DataSource, station_id: Option<&str>, message: &str) {
    match level {
        LogLevel::Trace => {
            tracing::trace!(source = %source, station = station_id.unwrap_or("-"), "{}", message)
        }
        LogLevel::Debug => debug(source, station_id, message),
        LogLevel::Info => info(source, station_id, message),
        LogLevel::Warning => warn(source, station_id, message),
        LogLevel::Error => error(source, station_id, message),
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a single document that did not make it into the store. Rejected
/// documents are warnings; datastore faults are errors.
pub fn log_insert_failure(failure: &InsertFailure) {
    let message = format!(
        "document #{} not inserted [{}]: {}",
        failure.index, failure.failure_type, failure.reason
    );
    let level = match failure.failure_type {
        FailureType::Expected => LogLevel::Warning,
        FailureType::Unexpected => LogLevel::Error,
    };
    log_at(level, DataSource::Database, Some(&failure.station_id), &message);
}

// ---------------------------------------------------------------------------
// Import Summary Logging
// ---------------------------------------------------------------------------

/// Severity of the end-of-run summary line.
pub fn summary_level(attempted: usize, failed: usize) -> LogLevel {
    if failed == 0 {
        LogLevel::Info
    } else if failed >= attempted {
        LogLevel::Error
    } else {
        LogLevel::Warning
    }
}

/// Log a summary of the bulk load
pub fn log_import_summary(attempted: usize, failed: usize) {
    let message = format!(
        "Import complete: {} documents attempted, {} rejected",
        attempted, failed
    );
    log_at(summary_level(attempted, failed), DataSource::Database, None, &message);
}
