//! Diagnostic logging
//!
//! Everything goes to stderr; stdout carries the run transcript only.
//! A rolling log file can be added from `[logging]`, and RUST_LOG may
//! raise or lower other crates.

use std::fs;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Flushes the log file on drop; hold it until the process exits
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber for `run` and `locate`
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuard> {
    let level = effective_level(settings, verbose, quiet);

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(settings.json_format)];
    let mut file_guard = None;
    if let Some(path) = settings.file.as_deref().filter(|p| !p.is_empty()) {
        let (writer, guard) = open_log_file(Path::new(path), settings)?;
        layers.push(file_layer(writer, settings.json_format));
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter_for(level)?)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(%level, file = ?settings.file, json = settings.json_format, "Logging ready");
    Ok(LogGuard { _file: file_guard })
}

/// Minimal stderr logging for commands that don't load a config
pub fn init_simple(level: Level) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// `-q` beats `-v`; otherwise each `-v` steps down from the configured level
fn effective_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => settings.level.parse().unwrap_or(Level::INFO),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// RUST_LOG drives other crates; hostprobe itself follows the CLI level
fn filter_for(level: Level) -> Result<EnvFilter> {
    let base = level.as_str().to_lowercase();
    let own = format!("hostprobe={}", base)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;

    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&base))
        .add_directive(own))
}

fn stderr_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    if json {
        Box::new(
            layer
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        )
    } else {
        Box::new(layer.compact())
    }
}

fn file_layer<S>(writer: NonBlocking, json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if json {
        Box::new(layer.json().with_span_events(FmtSpan::CLOSE))
    } else {
        Box::new(layer)
    }
}

/// Time-based rotation only; a small size cap picks the shorter period
fn rotation_for(max_file_size_mb: u64) -> Rotation {
    match max_file_size_mb {
        1..=9 => Rotation::HOURLY,
        _ => Rotation::DAILY,
    }
}

fn open_log_file(path: &Path, settings: &LoggingSettings) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|source| Error::IoWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("hostprobe.log");
    let appender = RollingFileAppender::builder()
        .rotation(rotation_for(settings.max_file_size_mb))
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(settings.max_files.max(1) as usize)
        .build(dir)
        .map_err(|e| Error::Config(format!("Cannot open log file {}: {}", path.display(), e)))?;

    Ok(tracing_appender::non_blocking(appender))
}
