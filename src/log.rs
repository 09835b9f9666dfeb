//! Structured logging setup.
//!
//! The engine logs through `tracing` macros everywhere; this module installs
//! the subscriber that formats them.
//!
//! Log levels:
//! - ERROR: Failures the caller must act on
//! - WARN: Node failures, refused optimizations, dropped pattern edges
//! - INFO: Graph submitted, optimized, run finished
//! - DEBUG: Per-node dispatch, completion, and pass results
//! - TRACE: Queue operations and individual metadata changes
//!
//! The level comes from `DAGFLOW_LOG` (a level name or a full filter
//! directive). Debug mode can be enabled with `init_with_debug(true)` or
//! `DAGFLOW_DEBUG=1`. Output goes to `~/.dagflow/dagflow.log`, truncated on
//! init, or to stderr when no home directory is available.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::EngineConfig;
use crate::Result;

/// Environment variable holding the level or filter directive.
pub const LOG_ENV: &str = "DAGFLOW_LOG";

/// Environment variable enabling debug mode.
pub const DEBUG_ENV: &str = "DAGFLOW_DEBUG";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
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

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Path of the log file.
pub fn log_path() -> Result<PathBuf> {
    Ok(EngineConfig::dagflow_dir()?.join("dagflow.log"))
}

/// Initialize logging at INFO, or DEBUG if `DAGFLOW_DEBUG` is set.
pub fn init() -> Result<()> {
    init_with_debug(false)
}

/// Initialize logging with explicit debug mode setting.
///
/// Installing a second subscriber is a no-op.
pub fn init_with_debug(debug: bool) -> Result<()> {
    let env_debug = std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);
    let debug_enabled = debug || env_debug;
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let default_level = if debug_enabled {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let filter = filter_from(std::env::var(LOG_ENV).ok().as_deref(), default_level);

    let layer = match open_log_file() {
        Some(file) => fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed(),
        None => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(debug = debug_enabled, "logging initialized");
    }
    Ok(())
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Build a filter from a level name, a filter directive, or the default.
fn filter_from(value: Option<&str>, default: LogLevel) -> EnvFilter {
    let directive = match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match LogLevel::parse(s) {
            Some(level) => tracing::Level::from(level).to_string(),
            None => s.to_string(),
        },
        None => tracing::Level::from(default).to_string(),
    };
    EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::from(default).to_string()))
}

fn open_log_file() -> Option<File> {
    let path = log_path().ok()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    File::create(path).ok()
}
