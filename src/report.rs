//! Audit outcomes and the `result.json` writer.
//!
//! `result.json` is rewritten after every audit so that it is valid JSON even
//! if the run stops early:
//!
//! ```json
//! { "./linux.json": [
//!     { "Name": "greeting", "Command": "echo hallo",
//!       "Command was executed": true, "Output is as expected": true }
//! ] }
//! ```

use crate::error_codes::{AuditError, ErrorCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the result document inside the output directory.
pub const RESULT_FILE: &str = "result.json";

/// The judgement for one audit.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonOutcome {
    pub name: String,
    pub command: String,
    /// Whether the underlying command ran.
    pub executed: bool,
    /// Whether the output matched the expected value.
    pub matched: bool,
    pub error: Option<AuditError>,
    /// Captured output, normalized for comparison.
    pub output: String,
    pub expected: String,
    pub operator: String,
    /// Zero-based index of the failing pipeline step.
    pub fail_position: Option<usize>,
    pub artifacts: Vec<PathBuf>,
}

impl ComparisonOutcome {
    /// An outcome with nothing executed and nothing recorded yet.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            executed: false,
            matched: false,
            error: None,
            output: String::new(),
            expected: String::new(),
            operator: String::new(),
            fail_position: None,
            artifacts: Vec::new(),
        }
    }

    /// Classification label of the attached error, if any.
    #[must_use]
    pub fn error_label(&self) -> Option<&'static str> {
        self.error.as_ref().map(AuditError::label)
    }

    /// The entry written to `result.json`.
    #[must_use]
    pub fn to_entry(&self) -> ResultEntry {
        let (error_message, error_code) = match &self.error {
            Some(err) => (Some(error_message(err)), Some(err.code.as_str())),
            None => (None, None),
        };

        if !self.executed {
            return ResultEntry {
                name: self.name.clone(),
                command: self.command.clone(),
                executed: false,
                matched: None,
                expected: None,
                actual: None,
                operator: None,
                error_message,
                error_code,
            };
        }
        if self.matched {
            return ResultEntry {
                name: self.name.clone(),
                command: self.command.clone(),
                executed: true,
                matched: Some(true),
                expected: None,
                actual: None,
                operator: None,
                error_message: None,
                error_code: None,
            };
        }
        ResultEntry {
            name: self.name.clone(),
            command: self.command.clone(),
            executed: true,
            matched: Some(false),
            expected: Some(self.expected.clone()),
            actual: Some(self.output.clone()),
            operator: Some(self.operator.clone()),
            error_message,
            error_code,
        }
    }
}

/// Host refusals carry the host's own text; everything else is reported by
/// its stable label.
fn error_message(err: &AuditError) -> String {
    if err.code == ErrorCode::HostRefused {
        err.message.clone()
    } else {
        err.label().to_string()
    }
}

/// One serialized outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Command was executed")]
    pub executed: bool,
    #[serde(rename = "Output is as expected", skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(rename = "Expected Value", skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(rename = "Actual Value", skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(rename = "Operator", skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(rename = "Error-Message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "Error-Code", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

#[derive(Debug)]
pub enum ReportError {
    Io { path: PathBuf, source: io::Error },
    Serialize(serde_json::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot write {}: {source}", path.display()),
            Self::Serialize(err) => write!(f, "cannot serialize results: {err}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err)
    }
}

/// Receives one outcome per audit, in run order.
pub trait ResultSink {
    fn record(&mut self, outcome: &ComparisonOutcome) -> Result<(), ReportError>;
}

/// Keeps outcomes in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub outcomes: Vec<ComparisonOutcome>,
}

impl ResultSink for MemorySink {
    fn record(&mut self, outcome: &ComparisonOutcome) -> Result<(), ReportError> {
        self.outcomes.push(outcome.clone());
        Ok(())
    }
}

/// Writes `result.json`, keyed by the configuration path.
#[derive(Debug)]
pub struct JsonResultWriter {
    path: PathBuf,
    key: String,
    entries: Vec<ResultEntry>,
}

impl JsonResultWriter {
    /// Writer for `<output_dir>/result.json`. Any previous file is replaced
    /// on the first record.
    #[must_use]
    pub fn new(output_dir: &Path, config_key: impl Into<String>) -> Self {
        Self {
            path: output_dir.join(RESULT_FILE),
            key: config_key.into(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Document text for the entries recorded so far.
    pub fn render(&self) -> Result<String, ReportError> {
        let mut document = BTreeMap::new();
        document.insert(self.key.as_str(), &self.entries);
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

impl ResultSink for JsonResultWriter {
    fn record(&mut self, outcome: &ComparisonOutcome) -> Result<(), ReportError> {
        self.entries.push(outcome.to_entry());
        let text = self.render()?;
        fs::write(&self.path, text).map_err(|source| ReportError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Totals over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub executed: usize,
    pub matched: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn add(&mut self, outcome: &ComparisonOutcome) {
        self.total += 1;
        if outcome.executed {
            self.executed += 1;
        }
        if outcome.matched {
            self.matched += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} audits: {} executed, {} as expected, {} failed",
            self.total, self.executed, self.matched, self.failed
        )
    }
}
