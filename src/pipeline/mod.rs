//! Audit command pipelines.
//!
//! An audit's command text such as `cat §file§/etc/passwd | grep root` is
//! split by [`parser`] into [`PipelineStep`]s, then checked against the
//! whitelist and assembled into one shell line by [`builder`].

pub mod builder;
pub mod parser;

pub use builder::{build, RejectedPipeline, ShellPipeline};
pub use parser::{parse, PipelineError};

use std::fmt;

/// Token that separates pipeline steps. Only matches as a standalone word.
pub const PIPE_TOKEN: &str = "|";

/// Prefix marking a token as a file-path reference.
pub const FILE_MARKER: &str = "§file§";

/// One command within an audit's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    /// Command name exactly as written in the audit.
    pub command: String,
    /// Arguments preceding any file marker.
    pub args: Vec<String>,
    /// Path carried by a `§file§` token, if present.
    pub file_path: Option<String>,
    /// Name of the owning audit.
    pub audit_name: String,
    /// Zero-based position in the pipeline.
    pub position: usize,
}

impl PipelineStep {
    /// Shell fragment for this step: lowercased command, arguments, then the
    /// file path as the final argument.
    #[must_use]
    pub fn shell_fragment(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        parts.push(self.command.to_lowercase());
        parts.extend(self.args.iter().cloned());
        if let Some(path) = &self.file_path {
            parts.push(path.clone());
        }
        parts.join(" ")
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.audit_name, self.position, self.command)
    }
}

/// Comma separated command names, as written to the `separated into` trace.
#[must_use]
pub fn describe(steps: &[PipelineStep]) -> String {
    steps
        .iter()
        .map(|step| step.command.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
