//! Logging setup for witkit binaries and embedding applications.
//!
//! The library only emits `tracing` events. Installing a subscriber is left to
//! the application; [`init_logging`] is the one the `witkit` CLI uses. Events
//! are written to stderr or a file, as text or JSON, filtered to the `witkit`
//! target.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::ConfigError;

const ENV_LOG_LEVEL: &str = "WITKIT_LOG_LEVEL";
const ENV_LOG_FILE: &str = "WITKIT_LOG_FILE";
const ENV_LOG_FORMAT: &str = "WITKIT_LOG_FORMAT";

/// Minimum severity of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

const LEVEL_NAMES: &[(&str, LogLevel)] = &[
    ("trace", LogLevel::Trace),
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("warning", LogLevel::Warn),
    ("error", LogLevel::Error),
];

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LEVEL_NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(_, level)| *level)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "log-level".to_string(),
                message: format!("'{s}' is not one of trace, debug, info, warn, error"),
            })
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact on stderr, with file and line when writing to a file.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("text") {
            Ok(Self::Text)
        } else if s.trim().eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(ConfigError::InvalidValue {
                field: "log-format".to_string(),
                message: format!("'{s}' is not one of text, json"),
            })
        }
    }
}

/// Where and how events are written. No level means no subscriber.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Option<LogLevel>,
    /// Stderr when unset.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
}

/// Keeps the background writer alive. Dropping it flushes buffered events.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Install the global subscriber described by `config`.
///
/// Returns `None` when no level is configured or the log file cannot be
/// opened. Hold the guard for the lifetime of the process.
///
/// # Example
///
/// ```rust,no_run
/// use witkit::logging::{LogConfig, LogLevel, LogFormat, init_logging};
///
/// let _guard = init_logging(LogConfig {
///     level: Some(LogLevel::Debug),
///     file: Some("/tmp/witkit.log".into()),
///     format: LogFormat::Json,
/// });
/// ```
#[must_use = "dropping the guard stops the log writer"]
pub fn init_logging(config: LogConfig) -> Option<LogGuard> {
    let level = tracing::Level::from(config.level?);
    let (writer, guard) = open_writer(config.file.as_deref())?;
    let to_file = config.file.is_some();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_file(to_file)
            .with_line_number(to_file)
            .boxed(),
        LogFormat::Text if to_file => fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Text => fmt::layer().with_writer(writer).compact().boxed(),
    };

    // Dependencies stay quiet
    let filter = EnvFilter::new(format!("witkit={level}"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    Some(LogGuard { _guard: guard })
}

fn open_writer(file: Option<&Path>) -> Option<(NonBlocking, WorkerGuard)> {
    match file {
        Some(path) => std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
            .map(tracing_appender::non_blocking),
        None => Some(tracing_appender::non_blocking(std::io::stderr())),
    }
}

/// Read the logging settings straight from the raw arguments and environment.
///
/// Runs before clap so that argument parsing itself can be logged. Each flag
/// beats its `WITKIT_LOG_*` variable; `-v`/`--verbose` means debug when no
/// level is given anywhere else.
#[must_use]
pub fn parse_early_log_config(args: &[String]) -> LogConfig {
    let setting = |flag: &str, var: &str| {
        extract_arg_value(args, flag).or_else(|| std::env::var(var).ok())
    };
    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");

    LogConfig {
        level: setting("--log-level", ENV_LOG_LEVEL)
            .and_then(|s| s.parse().ok())
            .or(verbose.then_some(LogLevel::Debug)),
        file: setting("--log-file", ENV_LOG_FILE).map(PathBuf::from),
        format: setting("--log-format", ENV_LOG_FORMAT)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
    }
}

/// Value of `flag`, given either as the next argument or as `flag=value`.
fn extract_arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(value.to_string());
        }
    }
    None
}
