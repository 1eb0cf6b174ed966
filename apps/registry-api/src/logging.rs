//! Tracing subscriber setup.
//!
//! `RUST_LOG`, when set, overrides the configured level. Output goes to
//! stdout, to a rolling file, or to both (`multi`). File output is written
//! through a non-blocking worker whose guard must outlive the program.

use crate::config::LoggingConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::ParseError, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError, EnvFilter, Layer, Registry,
};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Unsupported log output: {0}")]
    UnsupportedOutput(String),

    #[error("Unsupported log rotation: {0}")]
    UnsupportedRotation(String),

    #[error("Invalid log file path: {0}")]
    FilePath(String),

    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file: {0}")]
    FileAppender(#[from] InitError),

    #[error("Failed to install tracing subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Multi,
}

impl LogOutput {
    /// # Errors
    ///
    /// Returns `LoggingError::UnsupportedOutput` for anything but
    /// `stdout`, `file` or `multi`.
    pub fn parse(raw: &str) -> Result<Self, LoggingError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "stdout" => Ok(LogOutput::Stdout),
            "file" => Ok(LogOutput::File),
            "multi" => Ok(LogOutput::Multi),
            _ => Err(LoggingError::UnsupportedOutput(raw.to_string())),
        }
    }

    fn to_stdout(self) -> bool {
        matches!(self, LogOutput::Stdout | LogOutput::Multi)
    }

    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Multi)
    }
}

fn parse_rotation(raw: &str) -> Result<Rotation, LoggingError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "daily" => Ok(Rotation::DAILY),
        "hourly" => Ok(Rotation::HOURLY),
        "minutely" => Ok(Rotation::MINUTELY),
        "never" => Ok(Rotation::NEVER),
        _ => Err(LoggingError::UnsupportedRotation(raw.to_string())),
    }
}

/// Keeps the file writer's background worker alive. Dropping it flushes
/// buffered lines.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer<W>(human_readable: bool, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if human_readable {
        fmt::layer()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .flatten_event(true)
            .with_writer(writer)
            .boxed()
    }
}

fn rolling_file(config: &LoggingConfig) -> Result<RollingFileAppender, LoggingError> {
    let path = PathBuf::from(config.file_path.trim());
    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LoggingError::FilePath(config.file_path.clone()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let mut builder = RollingFileAppender::builder()
        .rotation(parse_rotation(&config.rotation)?)
        .filename_prefix(prefix);
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        builder = builder.filename_suffix(ext);
    }
    if config.max_backups > 0 {
        builder = builder.max_log_files(config.max_backups.saturating_add(1));
    }
    Ok(builder.build(dir)?)
}

/// Build the output layers for `config` without installing them.
///
/// # Errors
///
/// Returns an error for an unknown output or rotation, or if the log file
/// cannot be opened.
pub fn build_layers(config: &LoggingConfig) -> Result<(Vec<BoxedLayer>, LogGuard), LoggingError> {
    let output = LogOutput::parse(&config.output)?;
    let human_readable = is_human_readable(&config.format);
    let mut layers = Vec::new();
    let mut guard = LogGuard::default();

    if output.to_stdout() {
        layers.push(fmt_layer(human_readable, true, std::io::stdout));
    }
    if output.to_file() {
        let (writer, worker) = tracing_appender::non_blocking(rolling_file(config)?);
        layers.push(fmt_layer(human_readable, false, writer));
        guard._worker = Some(worker);
    }
    Ok((layers, guard))
}

/// Install the global subscriber.
///
/// `format` selects JSON (the default) or human-readable output via
/// `pretty`/`console`/`text`. Keep the returned guard until shutdown.
///
/// # Errors
///
/// Returns an error if the filter or output settings are invalid, or a
/// subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let (layers, guard) = build_layers(config)?;

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        output = %config.output,
        "Logging initialized"
    );
    Ok(guard)
}

fn is_human_readable(format: &str) -> bool {
    matches!(
        format.to_ascii_lowercase().as_str(),
        "pretty" | "console" | "text"
    )
}

/// Initialize logging for tests (with simpler output).
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
