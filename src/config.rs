//! Audit configuration loading and validation.
//!
//! The configuration is a JSON document with a `commands` array and a
//! `system` block:
//!
//! ```json
//! {
//!   "commands": [
//!     { "name": "hostname", "command": "hostname", "typeExpected": "nil" }
//!   ],
//!   "system": { "systemName": "linux", "version": "1", "root": false }
//! }
//! ```
//!
//! Keys are accepted in camel case and all lowercase. Every structural
//! problem is fatal and reported before any audit runs. The comparison
//! operator is deliberately left unchecked here: an unknown operator only
//! fails its own audit.

use crate::error_codes::{AuditError, ErrorCode};
use crate::executor::ShellSpec;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Operator used when `typeExpected` is empty.
pub const DEFAULT_OPERATOR: &str = "==";

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(alias = "Commands")]
    commands: Vec<RawAudit>,
    #[serde(alias = "System")]
    system: Option<RawSystem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAudit {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Command")]
    command: String,
    #[serde(rename = "dontSaveArtefact", alias = "dontsaveartefact")]
    dont_save_artefact: bool,
    #[serde(rename = "blackenContent", alias = "blackencontent")]
    blacken_content: String,
    #[serde(rename = "typeExpected", alias = "typeexpected")]
    type_expected: String,
    #[serde(alias = "Expected")]
    expected: String,
    #[serde(alias = "Description")]
    description: String,
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct RawSystem {
    #[serde(rename = "systemName", alias = "systemname", alias = "SystemName")]
    system_name: String,
    #[serde(alias = "Version")]
    version: String,
    #[serde(alias = "Shell")]
    shell: String,
    #[serde(alias = "Argument")]
    argument: String,
    #[serde(alias = "Root")]
    root: bool,
}

// ============================================================================
// Validated model
// ============================================================================

/// One declared check.
#[derive(Debug, Clone)]
pub struct AuditSpec {
    pub name: String,
    /// Script source evaluated in the sandbox.
    pub command: String,
    /// Operator text as written; empty means [`DEFAULT_OPERATOR`].
    pub operator: String,
    pub expected: String,
    pub dont_save_artifact: bool,
    /// Compiled `blackenContent` pattern.
    pub redaction: Option<Regex>,
    pub description: String,
}

impl AuditSpec {
    /// An audit with defaults for everything but name and command.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            operator: String::new(),
            expected: String::new(),
            dont_save_artifact: false,
            redaction: None,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn expecting(mut self, operator: impl Into<String>, expected: impl Into<String>) -> Self {
        self.operator = operator.into();
        self.expected = expected.into();
        self
    }

    /// The operator to compare with, defaulting empty text to `==`.
    #[must_use]
    pub fn effective_operator(&self) -> &str {
        if self.operator.is_empty() {
            DEFAULT_OPERATOR
        } else {
            &self.operator
        }
    }
}

/// The host the configuration was written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSpec {
    pub name: String,
    pub version: String,
    pub shell: ShellSpec,
    pub root: bool,
}

/// A loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Normalized input path, used as the key in `result.json`.
    pub source: String,
    pub system: SystemSpec,
    pub audits: Vec<AuditSpec>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Unreadable { path: String, source: io::Error },
    Format(serde_json::Error),
    MissingSystem,
    MissingSystemName,
    MissingVersion,
    NoAudits,
    /// A malformed audit entry, with its one-based position.
    InvalidAudit { position: usize, reason: String },
    InvalidRedaction {
        position: usize,
        source: regex::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unreadable { .. } => ErrorCode::ConfigFileUnreadable,
            Self::Format(_) => ErrorCode::ConfigParseError,
            Self::MissingSystem | Self::MissingSystemName | Self::MissingVersion => {
                ErrorCode::InvalidSystem
            }
            Self::NoAudits => ErrorCode::NoAudits,
            Self::InvalidAudit { .. } | Self::InvalidRedaction { .. } => ErrorCode::InvalidAudit,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable { path, source } => write!(f, "cannot read {path}: {source}"),
            Self::Format(err) => write!(f, "JSON format incorrect: {err}"),
            Self::MissingSystem => {
                write!(f, "you have to specify the system in your config file")
            }
            Self::MissingSystemName => {
                write!(f, "you have to specify the systemName in your config file")
            }
            Self::MissingVersion => {
                write!(f, "you have to specify the version in your config file")
            }
            Self::NoAudits => write!(
                f,
                "you have to specify at least one command in your config file"
            ),
            Self::InvalidAudit { position, reason } => {
                write!(f, "Issue at the {} audit. {reason}", ordinal(*position))
            }
            Self::InvalidRedaction { position, source } => write!(
                f,
                "Issue at the {} audit. The blackenContent pattern is invalid: {source}",
                ordinal(*position)
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unreadable { source, .. } => Some(source),
            Self::Format(err) => Some(err),
            Self::InvalidRedaction { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err)
    }
}

impl From<&ConfigError> for AuditError {
    fn from(err: &ConfigError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `1st`, `2nd`, `3rd`, `4th`; the suffix depends on the last digit only,
/// so 11 becomes `11st`.
#[must_use]
pub fn ordinal(n: usize) -> String {
    let suffix = match n % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Characters that may not appear in an audit name on this platform.
#[cfg(windows)]
pub const RESERVED_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
#[cfg(not(windows))]
pub const RESERVED_NAME_CHARS: &[char] = &['/'];

/// Normalize an `--input` value: add `.json` when missing, turn backslashes
/// into slashes, and prefix `./` for bare file names.
#[must_use]
pub fn normalize_input_path(input: &str) -> String {
    let mut path = input.to_string();
    let has_json = path
        .len()
        .checked_sub(5)
        .and_then(|start| path.get(start..))
        .is_some_and(|end| end.eq_ignore_ascii_case(".json"));
    if !has_json {
        path.push_str(".json");
    }
    let path = path.replace("\\\\", "/").replace('\\', "/");
    if path.contains('/') {
        path
    } else {
        format!("./{path}")
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AuditConfig {
    /// Read and validate the configuration named by `input`.
    pub fn load(input: &str) -> Result<Self, ConfigError> {
        let source = normalize_input_path(input);
        let text = fs::read_to_string(Path::new(&source)).map_err(|err| {
            ConfigError::Unreadable {
                path: source.clone(),
                source: err,
            }
        })?;
        info!(path = %source, "input file opened");
        Self::from_json(&source, &text)
    }

    /// Parse and validate configuration text. `source` labels the result.
    pub fn from_json(source: &str, text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        debug!("JSON format correct");

        let system = validate_system(raw.system)?;
        let audits = validate_audits(raw.commands)?;
        info!(audits = audits.len(), system = %system.name, "configuration loaded");

        Ok(Self {
            source: source.to_string(),
            system,
            audits,
        })
    }
}

fn validate_system(raw: Option<RawSystem>) -> Result<SystemSpec, ConfigError> {
    let raw = match raw {
        Some(system) if system != RawSystem::default() => system,
        _ => return Err(ConfigError::MissingSystem),
    };
    if raw.system_name.is_empty() {
        return Err(ConfigError::MissingSystemName);
    }
    if raw.version.is_empty() {
        return Err(ConfigError::MissingVersion);
    }

    let defaults = ShellSpec::platform_default();
    let program = if raw.shell.is_empty() {
        debug!(shell = %defaults.program, "using default shell");
        defaults.program
    } else {
        raw.shell
    };
    let argument = if raw.argument.is_empty() {
        debug!(argument = %defaults.argument, "using default shell argument");
        defaults.argument
    } else {
        raw.argument
    };

    Ok(SystemSpec {
        name: raw.system_name,
        version: raw.version,
        shell: ShellSpec::new(program, argument),
        root: raw.root,
    })
}

fn validate_audits(raw: Vec<RawAudit>) -> Result<Vec<AuditSpec>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NoAudits);
    }

    let mut seen: Vec<(String, usize)> = Vec::with_capacity(raw.len());
    let mut audits = Vec::with_capacity(raw.len());

    for (index, audit) in raw.into_iter().enumerate() {
        let position = index + 1;
        let invalid = |reason: String| ConfigError::InvalidAudit { position, reason };

        if audit.name.is_empty() {
            return Err(invalid(
                "You have to specify the name in your config file".into(),
            ));
        }
        if let Some(c) = audit.name.chars().find(|c| RESERVED_NAME_CHARS.contains(c)) {
            return Err(invalid(format!(
                "The character \"{c}\" in name is not allowed"
            )));
        }
        if audit.command.is_empty() {
            return Err(invalid(
                "You have to specify the command in your config file".into(),
            ));
        }

        let folded = audit.name.to_lowercase();
        if let Some((_, first)) = seen.iter().find(|(name, _)| *name == folded) {
            return Err(invalid(format!(
                "The audit name \"{}\" was already used in the {} audit",
                audit.name,
                ordinal(*first)
            )));
        }
        seen.push((folded, position));

        let redaction = if audit.blacken_content.is_empty() {
            None
        } else {
            Some(
                Regex::new(&audit.blacken_content)
                    .map_err(|source| ConfigError::InvalidRedaction { position, source })?,
            )
        };

        audits.push(AuditSpec {
            name: audit.name,
            command: audit.command,
            operator: audit.type_expected,
            expected: audit.expected,
            dont_save_artifact: audit.dont_save_artefact,
            redaction,
            description: audit.description,
        });
    }
    debug!("all audits have the required structure");
    Ok(audits)
}
