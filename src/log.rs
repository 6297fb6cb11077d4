//! File logging for casewatch.
//!
//! Log levels:
//! - ERROR: Failed user actions (run, edit, download, delete) and hard poll failures
//! - WARN: Recoverable conditions (a transient poll failure)
//! - INFO: High-level notifications (startup, reconciliations)
//! - DEBUG: Poller start/stop, commands, config loading
//! - TRACE: Every HTTP response
//!
//! The TUI owns the terminal, so everything goes to a file, by default
//! `~/.casewatch/casewatch.log`. The level comes from `log_level` in the
//! config; `--debug` or `CASEWATCH_DEBUG=1` raise it to at least DEBUG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config::Config;

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// Effective level: the configured one (INFO when unset), raised to DEBUG
/// when debugging was requested. A configured TRACE is kept.
pub fn resolve_level(configured: Option<LogLevel>, debug: bool) -> LogLevel {
    let level = configured.unwrap_or(LogLevel::Info);
    if debug {
        level.max(LogLevel::Debug)
    } else {
        level
    }
}

fn debug_from_env() -> bool {
    std::env::var("CASEWATCH_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Appends timestamped lines at or below its level to one file.
#[derive(Debug)]
pub struct Logger {
    path: PathBuf,
    level: LogLevel,
}

impl Logger {
    /// Truncates the file so every session starts with an empty log.
    pub fn create(path: impl Into<PathBuf>, level: LogLevel) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, "")?;
        Ok(Self { path, level })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level
    }

    pub fn write(&self, level: LogLevel, msg: &str) {
        if !self.enabled(level) {
            return;
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
        }
    }
}

/// Install the global logger from the config. Without a home directory
/// nothing is logged.
pub fn init(config: &Config, debug: bool) {
    let level = resolve_level(config.log_level, debug || debug_from_env());
    let Some(path) = config.log_path() else {
        return;
    };
    if let Ok(logger) = Logger::create(path, level) {
        LOGGER.set(logger).ok();
    }
}

/// Current level; ERROR when logging is not initialised.
pub fn level() -> LogLevel {
    LOGGER.get().map_or(LogLevel::Error, Logger::level)
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    if let Some(logger) = LOGGER.get() {
        logger.write(level, msg);
    }
}

pub fn log(msg: &str) {
    log_at(LogLevel::Info, msg);
}

pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! cwlog {
    ($($arg:tt)*) => {
        $crate::log::log(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! cwlog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! cwlog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level.
#[macro_export]
macro_rules! cwlog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

/// Log macro for TRACE level.
#[macro_export]
macro_rules! cwlog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
