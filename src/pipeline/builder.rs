//! Whitelist validation and shell-line assembly.
//!
//! Validated steps accumulate in a [`ShellPipeline`]. The accumulator is
//! reset at the start of every [`build`], and keeps the steps validated so
//! far when a later step is rejected.

use super::PipelineStep;
use crate::whitelist::Whitelist;
use std::fmt;

/// Separator used between step fragments on the shell line.
const SHELL_PIPE: &str = " | ";

/// Validated steps and their shell fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellPipeline {
    steps: Vec<PipelineStep>,
    fragments: Vec<String>,
}

impl ShellPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything accumulated so far.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.fragments.clear();
    }

    fn push(&mut self, step: PipelineStep) {
        self.fragments.push(step.shell_fragment());
        self.steps.push(step);
    }

    #[must_use]
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    #[must_use]
    pub fn first_step(&self) -> Option<&PipelineStep> {
        self.steps.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The whole composite line, `step0 | step1 | ...`.
    #[must_use]
    pub fn line(&self) -> String {
        self.fragments.join(SHELL_PIPE)
    }

    /// The composite line up to and including step `last`.
    #[must_use]
    pub fn prefix(&self, last: usize) -> String {
        let end = (last + 1).min(self.fragments.len());
        self.fragments[..end].join(SHELL_PIPE)
    }
}

/// A step whose command is not whitelisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPipeline {
    /// Zero-based index of the first disallowed step.
    pub position: usize,
    /// The disallowed command name as written.
    pub command: String,
}

impl fmt::Display for RejectedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not find command: {}", self.command)
    }
}

impl std::error::Error for RejectedPipeline {}

/// Validate `steps` in order and accumulate them into `pipeline`.
///
/// Stops at the first step that is not whitelisted. Steps before it stay in
/// `pipeline` so the caller can report how far the pipeline got.
pub fn build(
    steps: Vec<PipelineStep>,
    whitelist: &Whitelist,
    pipeline: &mut ShellPipeline,
) -> Result<(), RejectedPipeline> {
    pipeline.reset();
    for step in steps {
        if !whitelist.is_allowed(&step.command) {
            return Err(RejectedPipeline {
                position: step.position,
                command: step.command,
            });
        }
        pipeline.push(step);
    }
    Ok(())
}
