//! Log sinks for a run.
//!
//! Every component emits `tracing` events; this module decides where they
//! land. Three plain-text files are written into the output directory:
//!
//! - `audit.log`: INFO and above
//! - `error.log`: ERROR only
//! - `debug.log`: everything, only with `--debug`
//!
//! Lines look like `19.10.2026 14:03  INFO greeting separated into: echo`.
//! A stderr layer is added when a filter is given (`HOSTAUDIT_LOG`).

use chrono::Local;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const AUDIT_LOG: &str = "audit.log";
pub const ERROR_LOG: &str = "error.log";
pub const DEBUG_LOG: &str = "debug.log";

/// Environment variable holding the stderr filter directives.
pub const LOG_ENV: &str = "HOSTAUDIT_LOG";

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Local wall-clock timestamps in day-first order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(TIMESTAMP_FORMAT))
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub output_dir: PathBuf,
    /// Also write `debug.log`.
    pub debug: bool,
    /// Filter directives for the stderr layer; no stderr output when unset.
    pub stderr_filter: Option<String>,
}

impl LogConfig {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            debug: false,
            stderr_filter: None,
        }
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn stderr_filter(mut self, directives: Option<String>) -> Self {
        self.stderr_filter = directives.filter(|d| !d.trim().is_empty());
        self
    }
}

#[derive(Debug)]
pub enum LoggingError {
    Io { path: PathBuf, source: io::Error },
    Init(tracing_subscriber::util::TryInitError),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot create log file {}: {source}", path.display())
            }
            Self::Init(err) => write!(f, "cannot install logger: {err}"),
        }
    }
}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Init(err) => Some(err),
        }
    }
}

fn create_log(dir: &Path, name: &str) -> Result<Mutex<File>, LoggingError> {
    let path = dir.join(name);
    File::create(&path)
        .map(Mutex::new)
        .map_err(|source| LoggingError::Io { path, source })
}

/// Build the subscriber without installing it. Log files are truncated.
pub fn build(config: &LogConfig) -> Result<impl Subscriber + Send + Sync + 'static, LoggingError> {
    fs::create_dir_all(&config.output_dir).map_err(|source| LoggingError::Io {
        path: config.output_dir.clone(),
        source,
    })?;

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(create_log(&config.output_dir, AUDIT_LOG)?)
        .with_timer(LocalTimer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::INFO);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(create_log(&config.output_dir, ERROR_LOG)?)
        .with_timer(LocalTimer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = if config.debug {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(create_log(&config.output_dir, DEBUG_LOG)?)
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_filter(LevelFilter::TRACE),
        )
    } else {
        None
    };

    let stderr_layer = config.stderr_filter.as_deref().map(|directives| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .compact()
            .with_filter(EnvFilter::new(directives))
    });

    Ok(tracing_subscriber::registry()
        .with(audit_layer)
        .with(error_layer)
        .with(debug_layer)
        .with(stderr_layer))
}

/// Build and install the global subscriber.
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    build(config)?.try_init().map_err(LoggingError::Init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing::{debug, error, info, warn};

    fn read(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn timestamp_is_day_first() {
        let mut text = String::new();
        LocalTimer.format_time(&mut Writer::new(&mut text)).unwrap();
        let pattern = regex::Regex::new(r"^\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}$").unwrap();
        assert!(pattern.is_match(&text), "unexpected timestamp {text:?}");
    }

    #[test]
    fn files_receive_their_levels() {
        let tmp = TempDir::new().unwrap();
        let subscriber = build(&LogConfig::new(tmp.path())).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            info!(audit = "greeting", "greeting separated into: echo");
            warn!(status = "FAIL", "wrapper failed on position 2");
            error!("cannot save artifact");
            debug!("evaluating");
        });

        let audit = read(tmp.path(), AUDIT_LOG);
        assert!(audit.contains("separated into: echo"));
        assert!(audit.contains("wrapper failed"));
        assert!(audit.contains("cannot save artifact"));
        assert!(!audit.contains("evaluating"));
        assert!(!audit.contains('\u{1b}'), "no ANSI escapes in files");

        let errors = read(tmp.path(), ERROR_LOG);
        assert!(errors.contains("cannot save artifact"));
        assert!(!errors.contains("wrapper failed"));

        assert!(!tmp.path().join(DEBUG_LOG).exists());
    }

    #[test]
    fn debug_log_only_with_flag() {
        let tmp = TempDir::new().unwrap();
        let subscriber = build(&LogConfig::new(tmp.path()).debug(true)).unwrap();
        tracing::subscriber::with_default(subscriber, || debug!("evaluating"));
        assert!(read(tmp.path(), DEBUG_LOG).contains("evaluating"));
    }

    #[test]
    fn blank_filter_disables_stderr() {
        let config = LogConfig::new("out").stderr_filter(Some("  ".into()));
        assert!(config.stderr_filter.is_none());
    }
}
