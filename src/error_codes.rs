//! Standardized error codes for audit runs.
//!
//! Error codes follow the format `AUD-XXXX` where:
//!
//! - AUD-1xxx: Configuration errors (fatal, abort the run)
//! - AUD-2xxx: Whitelist violations
//! - AUD-3xxx: Pipeline execution errors
//! - AUD-4xxx: Script evaluation errors
//! - AUD-5xxx: Comparison errors
//! - AUD-6xxx: Output errors (artifacts, logs, results)
//!
//! Every code also carries a stable *label*. Labels are the classification
//! names written into results and logs, e.g. `unknown command` or
//! `script syntax error`, and must not change between releases.
//!
//! # Example
//!
//! ```
//! use hostaudit::error_codes::{AuditError, ErrorCode};
//!
//! let error = AuditError::new(ErrorCode::UnknownCommand, "Could not find command: foo")
//!     .add_context("position", 0);
//! assert_eq!(error.label(), "unknown command");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Error categories, one per failure class of an audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad specification or environment (AUD-1xxx). Aborts the run.
    Configuration,
    /// Command not on the whitelist (AUD-2xxx).
    Whitelist,
    /// Host command execution failed (AUD-3xxx).
    Execution,
    /// Script evaluation failed (AUD-4xxx).
    Script,
    /// Output could not be compared with the expected value (AUD-5xxx).
    Comparison,
    /// Artifacts, logs or results could not be written (AUD-6xxx).
    Output,
}

impl ErrorCategory {
    /// Only configuration errors stop the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Whitelist => write!(f, "whitelist"),
            Self::Execution => write!(f, "execution"),
            Self::Script => write!(f, "script"),
            Self::Comparison => write!(f, "comparison"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Standardized error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // ===========================================
    // AUD-1xxx: Configuration Errors
    // ===========================================
    /// AUD-1001: Configuration file could not be read
    #[serde(rename = "AUD-1001")]
    ConfigFileUnreadable,

    /// AUD-1002: Configuration file is not valid JSON for the schema
    #[serde(rename = "AUD-1002")]
    ConfigParseError,

    /// AUD-1003: System descriptor missing or incomplete
    #[serde(rename = "AUD-1003")]
    InvalidSystem,

    /// AUD-1004: No audits declared
    #[serde(rename = "AUD-1004")]
    NoAudits,

    /// AUD-1005: An audit entry is malformed
    #[serde(rename = "AUD-1005")]
    InvalidAudit,

    /// AUD-1006: Host does not match the declared system
    #[serde(rename = "AUD-1006")]
    SanityCheckFailed,

    // ===========================================
    // AUD-2xxx: Whitelist Violations
    // ===========================================
    /// AUD-2001: Command name not on the whitelist
    #[serde(rename = "AUD-2001")]
    UnknownCommand,

    /// AUD-2002: Command text does not form a valid pipeline
    #[serde(rename = "AUD-2002")]
    InvalidPipeline,

    // ===========================================
    // AUD-3xxx: Execution Errors
    // ===========================================
    /// AUD-3001: A pipeline step wrote to its error stream
    #[serde(rename = "AUD-3001")]
    CommandFailed,

    /// AUD-3002: A raw shell invocation wrote to its error stream
    #[serde(rename = "AUD-3002")]
    HostRefused,

    /// AUD-3003: The shell process could not be started
    #[serde(rename = "AUD-3003")]
    SpawnFailed,

    /// AUD-3004: Registry key not found
    #[serde(rename = "AUD-3004")]
    SettingScopeNotFound,

    /// AUD-3005: Registry value not found
    #[serde(rename = "AUD-3005")]
    SettingValueNotFound,

    // ===========================================
    // AUD-4xxx: Script Errors
    // ===========================================
    /// AUD-4001: Script could not be parsed
    #[serde(rename = "AUD-4001")]
    ScriptSyntaxError,

    /// AUD-4002: Script raised an error
    #[serde(rename = "AUD-4002")]
    ScriptError,

    /// AUD-4003: Script used a capability this platform does not offer
    #[serde(rename = "AUD-4003")]
    CapabilityNotFound,

    /// AUD-4004: Command text is empty after normalization
    #[serde(rename = "AUD-4004")]
    EmptyCommand,

    /// AUD-4005: printToLog called with an unknown level
    #[serde(rename = "AUD-4005")]
    InvalidLogLevel,

    // ===========================================
    // AUD-5xxx: Comparison Errors
    // ===========================================
    /// AUD-5001: Operator outside the supported set
    #[serde(rename = "AUD-5001")]
    InvalidOperator,

    /// AUD-5002: Ordering operator applied to strings
    #[serde(rename = "AUD-5002")]
    StringOperator,

    /// AUD-5003: One side is an integer, the other is not
    #[serde(rename = "AUD-5003")]
    TypeMismatch,

    /// AUD-5004: containsReg pattern does not compile
    #[serde(rename = "AUD-5004")]
    InvalidRegex,

    // ===========================================
    // AUD-6xxx: Output Errors
    // ===========================================
    /// AUD-6001: Artifact could not be written
    #[serde(rename = "AUD-6001")]
    ArtifactNotSaved,

    /// AUD-6002: Output directory, log or result file could not be written
    #[serde(rename = "AUD-6002")]
    OutputUnwritable,

    /// AUD-6003: Output archive could not be created
    #[serde(rename = "AUD-6003")]
    ArchiveFailed,
}

impl ErrorCode {
    /// Get the code as a string (e.g., "AUD-2001").
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigFileUnreadable => "AUD-1001",
            Self::ConfigParseError => "AUD-1002",
            Self::InvalidSystem => "AUD-1003",
            Self::NoAudits => "AUD-1004",
            Self::InvalidAudit => "AUD-1005",
            Self::SanityCheckFailed => "AUD-1006",
            Self::UnknownCommand => "AUD-2001",
            Self::InvalidPipeline => "AUD-2002",
            Self::CommandFailed => "AUD-3001",
            Self::HostRefused => "AUD-3002",
            Self::SpawnFailed => "AUD-3003",
            Self::SettingScopeNotFound => "AUD-3004",
            Self::SettingValueNotFound => "AUD-3005",
            Self::ScriptSyntaxError => "AUD-4001",
            Self::ScriptError => "AUD-4002",
            Self::CapabilityNotFound => "AUD-4003",
            Self::EmptyCommand => "AUD-4004",
            Self::InvalidLogLevel => "AUD-4005",
            Self::InvalidOperator => "AUD-5001",
            Self::StringOperator => "AUD-5002",
            Self::TypeMismatch => "AUD-5003",
            Self::InvalidRegex => "AUD-5004",
            Self::ArtifactNotSaved => "AUD-6001",
            Self::OutputUnwritable => "AUD-6002",
            Self::ArchiveFailed => "AUD-6003",
        }
    }

    /// Get the error category for this code.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigFileUnreadable
            | Self::ConfigParseError
            | Self::InvalidSystem
            | Self::NoAudits
            | Self::InvalidAudit
            | Self::SanityCheckFailed => ErrorCategory::Configuration,

            Self::UnknownCommand | Self::InvalidPipeline => ErrorCategory::Whitelist,

            Self::CommandFailed
            | Self::HostRefused
            | Self::SpawnFailed
            | Self::SettingScopeNotFound
            | Self::SettingValueNotFound => ErrorCategory::Execution,

            Self::ScriptSyntaxError
            | Self::ScriptError
            | Self::CapabilityNotFound
            | Self::EmptyCommand
            | Self::InvalidLogLevel => ErrorCategory::Script,

            Self::InvalidOperator
            | Self::StringOperator
            | Self::TypeMismatch
            | Self::InvalidRegex => ErrorCategory::Comparison,

            Self::ArtifactNotSaved | Self::OutputUnwritable | Self::ArchiveFailed => {
                ErrorCategory::Output
            }
        }
    }

    /// Stable classification label written to results and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ConfigFileUnreadable => "configuration unreadable",
            Self::ConfigParseError => "configuration format incorrect",
            Self::InvalidSystem => "invalid system",
            Self::NoAudits => "no audits",
            Self::InvalidAudit => "invalid audit",
            Self::SanityCheckFailed => "sanity check failed",
            Self::UnknownCommand => "unknown command",
            Self::InvalidPipeline => "invalid pipeline",
            Self::CommandFailed => "command failed",
            Self::HostRefused => "host refused",
            Self::SpawnFailed => "command not executed",
            Self::SettingScopeNotFound => "registry not found",
            Self::SettingValueNotFound => "value not found",
            Self::ScriptSyntaxError => "script syntax error",
            Self::ScriptError => "script error",
            Self::CapabilityNotFound => "capability not found",
            Self::EmptyCommand => "cannot execute command",
            Self::InvalidLogLevel => "invalid log level",
            Self::InvalidOperator => "invalid operator",
            Self::StringOperator => "operator not valid on a string",
            Self::TypeMismatch => "cannot compare string and integer",
            Self::InvalidRegex => "invalid regular expression",
            Self::ArtifactNotSaved => "artifact not saved",
            Self::OutputUnwritable => "output not writable",
            Self::ArchiveFailed => "archive not created",
        }
    }

    /// Get the numeric code value (e.g., 2001 for AUD-2001).
    #[must_use]
    pub const fn numeric_code(&self) -> u16 {
        match self {
            Self::ConfigFileUnreadable => 1001,
            Self::ConfigParseError => 1002,
            Self::InvalidSystem => 1003,
            Self::NoAudits => 1004,
            Self::InvalidAudit => 1005,
            Self::SanityCheckFailed => 1006,
            Self::UnknownCommand => 2001,
            Self::InvalidPipeline => 2002,
            Self::CommandFailed => 3001,
            Self::HostRefused => 3002,
            Self::SpawnFailed => 3003,
            Self::SettingScopeNotFound => 3004,
            Self::SettingValueNotFound => 3005,
            Self::ScriptSyntaxError => 4001,
            Self::ScriptError => 4002,
            Self::CapabilityNotFound => 4003,
            Self::EmptyCommand => 4004,
            Self::InvalidLogLevel => 4005,
            Self::InvalidOperator => 5001,
            Self::StringOperator => 5002,
            Self::TypeMismatch => 5003,
            Self::InvalidRegex => 5004,
            Self::ArtifactNotSaved => 6001,
            Self::OutputUnwritable => 6002,
            Self::ArchiveFailed => 6003,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured audit error with code, category, message, and context.
///
/// This is the form attached to a failed `ComparisonOutcome` and written to
/// `result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditError {
    /// The error code
    pub code: ErrorCode,

    /// The error category
    pub category: ErrorCategory,

    /// Human-readable error message (the original domain message)
    pub message: String,

    /// Additional context about the error
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl AuditError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            context: HashMap::new(),
        }
    }

    /// Add a context field to the error.
    #[must_use]
    pub fn add_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The stable classification label of this error.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.code.label()
    }

    /// Convert to JSON string.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","category":"{}","message":"{}"}}"#,
                self.code, self.category, self.message
            )
        })
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AuditError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ConfigFileUnreadable.as_str(), "AUD-1001");
        assert_eq!(ErrorCode::UnknownCommand.as_str(), "AUD-2001");
        assert_eq!(ErrorCode::CommandFailed.as_str(), "AUD-3001");
        assert_eq!(ErrorCode::ScriptSyntaxError.as_str(), "AUD-4001");
        assert_eq!(ErrorCode::InvalidOperator.as_str(), "AUD-5001");
        assert_eq!(ErrorCode::ArtifactNotSaved.as_str(), "AUD-6001");
    }

    #[test]
    fn test_numeric_code_matches_string() {
        for code in [
            ErrorCode::NoAudits,
            ErrorCode::InvalidPipeline,
            ErrorCode::SettingValueNotFound,
            ErrorCode::InvalidLogLevel,
            ErrorCode::InvalidRegex,
            ErrorCode::OutputUnwritable,
            ErrorCode::ArchiveFailed,
        ] {
            assert_eq!(code.as_str(), format!("AUD-{}", code.numeric_code()));
        }
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::SanityCheckFailed.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCode::UnknownCommand.category(), ErrorCategory::Whitelist);
        assert_eq!(ErrorCode::HostRefused.category(), ErrorCategory::Execution);
        assert_eq!(ErrorCode::CapabilityNotFound.category(), ErrorCategory::Script);
        assert_eq!(ErrorCode::TypeMismatch.category(), ErrorCategory::Comparison);
        assert!(ErrorCategory::Configuration.is_fatal());
        assert!(!ErrorCategory::Comparison.is_fatal());
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(ErrorCode::UnknownCommand.label(), "unknown command");
        assert_eq!(ErrorCode::ScriptSyntaxError.label(), "script syntax error");
        assert_eq!(ErrorCode::InvalidOperator.label(), "invalid operator");
        assert_eq!(ErrorCode::StringOperator.label(), "operator not valid on a string");
        assert_eq!(ErrorCode::TypeMismatch.label(), "cannot compare string and integer");
        assert_eq!(ErrorCode::SettingScopeNotFound.label(), "registry not found");
    }

    #[test]
    fn test_audit_error_with_context() {
        let error = AuditError::new(ErrorCode::CommandFailed, "ls failed")
            .add_context("position", 1)
            .add_context("command", "ls");
        assert_eq!(error.category, ErrorCategory::Execution);
        assert_eq!(error.context.get("position"), Some(&serde_json::json!(1)));
        assert_eq!(error.to_string(), "[AUD-3001] ls failed");
    }

    #[test]
    fn test_audit_error_json_roundtrip() {
        let error = AuditError::new(ErrorCode::InvalidOperator, "invalid operator: =~");
        let json = error.to_json();
        let parsed: AuditError = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(parsed, error);
        assert!(json.contains("\"AUD-5001\""));
        assert!(!json.contains("context"));
    }
}
