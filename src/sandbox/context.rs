//! Per-audit state shared with host capabilities.
//!
//! One [`ExecutionContext`] exists per audit. The engine creates it, hands
//! it to the sandbox for the duration of one evaluation, and reads the
//! captured output and any failure back afterwards.

use crate::config::AuditSpec;
use crate::error_codes::AuditError;
use crate::pipeline::ShellPipeline;
use regex::Regex;
use std::path::PathBuf;

/// Output preset by `callCompare` so a failed run never compares stale data.
pub const CALL_COMPARE_PRESET: &str = "§CALL_COMPARE_DOES_NOT_EXIST§";

/// Output preset by `callContains`.
pub const CALL_CONTAINS_PRESET: &str = "§CALL_CONTAIN_DOES_NOT_EXIST§";

#[derive(Debug, Default)]
pub struct ExecutionContext {
    audit_name: String,
    redaction: Option<Regex>,
    dont_save_artifact: bool,
    output: Option<String>,
    /// Accumulator for the pipeline currently being built.
    pub pipeline: ShellPipeline,
    pending_error: Option<AuditError>,
    fail_position: Option<usize>,
    artifacts: Vec<PathBuf>,
}

impl ExecutionContext {
    /// Fresh context with `audit` as the current audit.
    #[must_use]
    pub fn for_audit(audit: &AuditSpec) -> Self {
        Self {
            audit_name: audit.name.clone(),
            redaction: audit.redaction.clone(),
            dont_save_artifact: audit.dont_save_artifact,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn audit_name(&self) -> &str {
        &self.audit_name
    }

    #[must_use]
    pub fn redaction(&self) -> Option<&Regex> {
        self.redaction.as_ref()
    }

    /// Whether artifacts must not be written for the current audit.
    #[must_use]
    pub const fn artifacts_suppressed(&self) -> bool {
        self.dont_save_artifact
    }

    /// Most recent output set by a host capability, if any.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn set_output(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
    }

    /// Remember a host capability failure so the typed error survives the
    /// trip through the script engine.
    pub fn record_error(&mut self, error: AuditError) {
        self.pending_error = Some(error);
    }

    pub fn take_error(&mut self) -> Option<AuditError> {
        self.pending_error.take()
    }

    pub fn set_fail_position(&mut self, position: usize) {
        self.fail_position = Some(position);
    }

    /// Zero-based index of the pipeline step that failed, if one did.
    #[must_use]
    pub const fn fail_position(&self) -> Option<usize> {
        self.fail_position
    }

    pub fn push_artifact(&mut self, path: PathBuf) {
        self.artifacts.push(path);
    }

    #[must_use]
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }
}
