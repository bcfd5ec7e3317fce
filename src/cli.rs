//! Command-line surface.

use crate::archive::{self, ArchiveError};
use crate::config::{AuditConfig, ConfigError};
use crate::console::{self, Console};
use crate::engine::{Engine, EngineError};
use crate::error_codes::{AuditError, ErrorCode};
use crate::logging::{self, LOG_ENV, LogConfig, LoggingError};
use crate::platform::{self, SanityError};
use crate::report::{JsonResultWriter, RunSummary};
use crate::whitelist::{self, Whitelist};
use chrono::Local;
use clap::Parser;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Run declarative audit checks against this host.
#[derive(Debug, Parser)]
#[command(name = "hostaudit", version, about)]
pub struct Cli {
    /// Audit configuration file (`.json` is appended when missing)
    #[arg(short, long, env = "HOSTAUDIT_INPUT")]
    pub input: String,

    /// Extra commands to allow, comma separated
    #[arg(short, long, value_name = "COMMANDS")]
    pub add: Option<String>,

    /// Print one line per audit instead of a progress bar
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write debug.log
    #[arg(long)]
    pub debug: bool,

    /// Skip the operating system and privilege check
    #[arg(short, long)]
    pub skip_sanity: bool,

    /// Directory for logs, artifacts and result.json
    #[arg(short, long, default_value = "output", env = "HOSTAUDIT_OUTPUT")]
    pub output_dir: PathBuf,

    /// Name of the ZIP archive packed after the run (default:
    /// DD.MM.YY_HH-MM-SS.zip beside the output directory)
    #[arg(short = 'z', long, value_name = "NAME", env = "HOSTAUDIT_ARCHIVE")]
    pub archive: Option<String>,

    /// No colors and no progress bar
    #[arg(long)]
    pub no_color: bool,

    /// Filter directives for log output on stderr
    #[arg(long, env = LOG_ENV, hide = true)]
    pub log_filter: Option<String>,
}

/// Why a run stopped before or during auditing.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Sanity(SanityError),
    OutputDir { path: PathBuf, source: io::Error },
    Logging(LoggingError),
    Engine(EngineError),
    Archive(ArchiveError),
}

impl RunError {
    /// Process exit status: 1 for configuration problems, 2 for output
    /// problems.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Sanity(_) => 1,
            Self::OutputDir { .. } | Self::Logging(_) | Self::Engine(_) | Self::Archive(_) => 2,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = match self {
            Self::Config(err) => AuditError::from(err),
            Self::Sanity(err) => AuditError::new(ErrorCode::SanityCheckFailed, err.to_string()),
            Self::OutputDir { path, source } => AuditError::new(
                ErrorCode::OutputUnwritable,
                format!("cannot create output directory {}: {source}", path.display()),
            ),
            Self::Logging(err) => AuditError::new(ErrorCode::OutputUnwritable, err.to_string()),
            Self::Engine(err) => AuditError::new(ErrorCode::OutputUnwritable, err.to_string()),
            Self::Archive(err) => AuditError::new(ErrorCode::ArchiveFailed, err.to_string()),
        };
        fmt::Display::fmt(&error, f)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Sanity(err) => Some(err),
            Self::OutputDir { source, .. } => Some(source),
            Self::Logging(err) => Some(err),
            Self::Engine(err) => Some(err),
            Self::Archive(err) => Some(err),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<SanityError> for RunError {
    fn from(err: SanityError) -> Self {
        Self::Sanity(err)
    }
}

impl From<LoggingError> for RunError {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err)
    }
}

impl From<ArchiveError> for RunError {
    fn from(err: ArchiveError) -> Self {
        Self::Archive(err)
    }
}

impl From<EngineError> for RunError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

/// Whitelist with the built-in commands plus `--add`.
#[must_use]
pub fn build_whitelist(additions: Option<&str>) -> Whitelist {
    let mut list = Whitelist::with_builtins();
    if let Some(raw) = additions {
        let names = whitelist::parse_additions(raw);
        let added = list.register(&names);
        info!(added, requested = names.len(), "whitelist extended with: {}", names.join(", "));
    }
    list
}

/// Load, check and run one configuration.
pub fn run(cli: &Cli) -> Result<RunSummary, RunError> {
    fs::create_dir_all(&cli.output_dir).map_err(|source| RunError::OutputDir {
        path: cli.output_dir.clone(),
        source,
    })?;
    logging::init(
        &LogConfig::new(&cli.output_dir)
            .debug(cli.debug)
            .stderr_filter(cli.log_filter.clone()),
    )?;
    console::init(cli.no_color);

    let config = AuditConfig::load(&cli.input)?;
    if cli.skip_sanity {
        info!("sanity check skipped");
    } else {
        platform::sanity_check(&config.system.name, config.system.root)?;
        info!(os = platform::current_os(), "sanity check passed");
    }

    // Checked up front so a taken name does not cost a whole run.
    let archive_path = archive::resolve_path(cli.archive.as_deref(), &cli.output_dir, Local::now());
    archive::check_target(&archive_path)?;

    let whitelist = build_whitelist(cli.add.as_deref());
    let engine = Engine::new(&config, whitelist, &cli.output_dir)?;
    let mut results = JsonResultWriter::new(&cli.output_dir, config.source.as_str());
    let console = Console::new(config.audits.len(), cli.verbose);

    let summary = engine.run(&config.audits, &mut results, &console)?;
    console.finish(&summary);

    archive::package(&cli.output_dir, &archive_path)?;
    Ok(summary)
}

/// Entry point used by the binary.
pub fn main_with(cli: &Cli) -> ExitCode {
    match run(cli) {
        Ok(summary) => {
            if !cli.verbose {
                println!("{summary}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(code = err.exit_code(), "{err}");
            eprintln!("hostaudit: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
