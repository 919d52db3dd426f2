//! Logging for tgwatch.
//!
//! Two channels:
//! - diagnostic logs through `tracing`, written to stderr so JSON output on
//!   stdout stays parseable;
//! - the operation log, an append-only JSON-lines file per monitoring
//!   session recording what was collected.
//!
//! # Usage
//!
//! ```rust
//! use tgwatch::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Application started");
//! ```

use crate::error::{Result, WatchError};
use crate::storage::now_timestamp;
use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display.
    pub level: LogLevel,
    /// Output format for log messages.
    pub format: LogFormat,
    /// Include timestamps in log output.
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Enable ANSI colors in output.
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: true,
            target: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            colors: true,
        }
    }

    /// Debug level with module targets.
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            timestamps: true,
            target: true,
            colors: true,
        }
    }
}

impl LogLevel {
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// Initialize the logging system. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    // RUST_LOG wins over the presets
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("tgwatch={}", config.level.to_filter_string()))
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.pretty())
                .try_init()
                .ok();
        }
        (LogFormat::Pretty, false) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.pretty().without_time())
                .try_init()
                .ok();
        }
        (LogFormat::Compact, true) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.compact())
                .try_init()
                .ok();
        }
        (LogFormat::Compact, false) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.compact().without_time())
                .try_init()
                .ok();
        }
    }
}

/// Initialize logging with defaults suitable for CLI use.
pub fn init_cli_logging(quiet: bool, verbose: bool) {
    let config = if quiet {
        LogConfig::quiet()
    } else if verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&config);
}

/// A guard that logs the start and end of an operation.
pub struct OperationGuard {
    name: String,
    start: std::time::Instant,
}

impl OperationGuard {
    /// Start tracking an operation.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(operation = %name, "Starting operation");
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    /// Complete the operation successfully.
    pub fn complete(self) {
        tracing::info!(
            operation = %self.name,
            duration_ms = self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }

    /// Mark the operation as failed.
    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.name,
            duration_ms = self.start.elapsed().as_millis(),
            error = %error,
            "Operation failed"
        );
    }
}

// ============================================================================
// Operation log
// ============================================================================

#[derive(Serialize)]
struct OperationEntry<'a> {
    timestamp: String,
    operation: &'a str,
    data: &'a serde_json::Value,
}

/// Append-only JSON-lines record of collection activity.
#[derive(Debug)]
pub struct OperationLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl OperationLog {
    /// Start a new session file `session_<YYYYmmdd_HHMMSS>.log` in `log_dir`,
    /// creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create_session(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| WatchError::path_error("create directory", log_dir, e))?;
        let name = format!("session_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        Self::open(log_dir.join(name))
    }

    /// Open (or create) a log file for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WatchError::path_error("open", &path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `{timestamp, operation, data}` line.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    pub fn record(&self, operation: &str, data: &serde_json::Value) -> Result<()> {
        let entry = OperationEntry {
            timestamp: now_timestamp(),
            operation,
            data,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Session log files in `log_dir`, newest first. A missing directory has
/// no logs.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn session_logs(log_dir: &Path) -> Result<Vec<PathBuf>> {
    if !log_dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(log_dir)
        .map_err(|e| WatchError::path_error("read directory", log_dir, e))?;

    let mut logs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_session = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("session_") && n.ends_with(".log"));
        if is_session {
            logs.push(path);
        }
    }
    logs.sort_unstable_by(|a, b| b.cmp(a));
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("d".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("none".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_preset_configs() {
        assert_eq!(LogConfig::default().level, LogLevel::Warn);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
        let verbose = LogConfig::verbose();
        assert_eq!(verbose.level, LogLevel::Debug);
        assert_eq!(verbose.format, LogFormat::Pretty);
    }

    #[test]
    fn test_operation_log_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = OperationLog::create_session(&dir.path().join("logs")).unwrap();
        log.record("monitor_start", &json!({"offset": null})).unwrap();
        log.record("message_logged", &json!({"user_id": 1, "chat_id": -100}))
            .unwrap();

        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("session_") && name.ends_with(".log"));

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["operation"], "monitor_start");
        assert_eq!(lines[1]["data"]["chat_id"], -100);
        assert!(lines[1]["timestamp"].is_string());
    }

    #[test]
    fn test_operation_log_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.log");
        OperationLog::open(&path)
            .unwrap()
            .record("a", &json!({}))
            .unwrap();
        OperationLog::open(&path)
            .unwrap()
            .record("b", &json!({}))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_session_logs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        assert!(session_logs(&dir.path().join("absent")).unwrap().is_empty());

        for name in ["session_20240101_090000.log", "session_20240302_120000.log", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let logs = session_logs(dir.path()).unwrap();
        let names: Vec<_> = logs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            ["session_20240302_120000.log", "session_20240101_090000.log"]
        );
    }
}
