//! Per-audit control flow.
//!
//! Audits run strictly one after another: evaluate the command text in the
//! sandbox, judge the captured output, hand the outcome to the result sink.
//! Only setup and output failures stop a run; everything that goes wrong
//! inside one audit becomes that audit's outcome.

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::compare::{self, NOTHING_RETURNED, normalize_output};
use crate::config::{AuditConfig, AuditSpec};
use crate::console::{Console, ConsolePrinter};
use crate::error_codes::{AuditError, ErrorCode};
use crate::executor::Executor;
use crate::report::{ComparisonOutcome, ReportError, ResultSink, RunSummary};
use crate::sandbox::{ExecutionContext, HostBridge, Sandbox, SandboxError};
use crate::whitelist::Whitelist;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum EngineError {
    Sandbox(SandboxError),
    Artifacts(ArtifactError),
    Report(ReportError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandbox(err) => fmt::Display::fmt(err, f),
            Self::Artifacts(err) => write!(f, "cannot prepare artifact directory: {err}"),
            Self::Report(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sandbox(err) => Some(err),
            Self::Artifacts(err) => Some(err),
            Self::Report(err) => Some(err),
        }
    }
}

impl From<SandboxError> for EngineError {
    fn from(err: SandboxError) -> Self {
        Self::Sandbox(err)
    }
}

impl From<ArtifactError> for EngineError {
    fn from(err: ArtifactError) -> Self {
        Self::Artifacts(err)
    }
}

impl From<ReportError> for EngineError {
    fn from(err: ReportError) -> Self {
        Self::Report(err)
    }
}

/// Setting lookups that ran but found nothing still count as executed.
const fn ran_before_failing(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::SettingScopeNotFound | ErrorCode::SettingValueNotFound
    )
}

/// Runs a list of audits against one host.
#[derive(Debug)]
pub struct Engine {
    sandbox: Sandbox,
    artifacts: ArtifactStore,
    printer: ConsolePrinter,
}

impl Engine {
    /// Engine using the configured shell on the real host.
    pub fn new(
        config: &AuditConfig,
        whitelist: Whitelist,
        output_dir: &Path,
    ) -> Result<Self, EngineError> {
        Self::with_executor(Executor::new(config.system.shell.clone()), whitelist, output_dir)
    }

    /// Engine running commands through `executor`.
    pub fn with_executor(
        executor: Executor,
        whitelist: Whitelist,
        output_dir: &Path,
    ) -> Result<Self, EngineError> {
        let whitelist = Rc::new(whitelist);
        let artifacts = ArtifactStore::new(output_dir);
        let printer = ConsolePrinter::default();
        let host = HostBridge::new(whitelist.clone(), executor, artifacts.clone())
            .with_printer(printer.clone());
        let sandbox = Sandbox::new(Rc::new(host), whitelist)?;
        Ok(Self {
            sandbox,
            artifacts,
            printer,
        })
    }

    /// Run every audit in order. Artifacts from a previous run are removed
    /// first.
    pub fn run(
        &self,
        audits: &[AuditSpec],
        sink: &mut dyn ResultSink,
        console: &Console,
    ) -> Result<RunSummary, EngineError> {
        self.artifacts.clear()?;
        info!(audits = audits.len(), "run started");

        self.printer.attach(console);
        let recorded = self.run_all(audits, sink, console);
        self.printer.detach();
        let summary = recorded?;

        info!(
            total = summary.total,
            executed = summary.executed,
            matched = summary.matched,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }

    fn run_all(
        &self,
        audits: &[AuditSpec],
        sink: &mut dyn ResultSink,
        console: &Console,
    ) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary::default();
        for (index, audit) in audits.iter().enumerate() {
            console.audit_started(index, &audit.name);
            let outcome = self.run_audit(audit);
            console.audit_finished(&outcome);
            sink.record(&outcome)?;
            summary.add(&outcome);
        }
        Ok(summary)
    }

    /// Evaluate and judge one audit.
    pub fn run_audit(&self, audit: &AuditSpec) -> ComparisonOutcome {
        let mut outcome = ComparisonOutcome::new(&audit.name, &audit.command);
        outcome.expected = audit.expected.clone();
        outcome.operator = audit.effective_operator().to_string();

        let mut cx = ExecutionContext::for_audit(audit);
        let evaluated = self.sandbox.evaluate(&mut cx, &audit.command);
        outcome.fail_position = cx.fail_position();
        outcome.artifacts = cx.artifacts().to_vec();

        match evaluated {
            Ok(()) => {
                let output = cx.output().unwrap_or(NOTHING_RETURNED);
                outcome.executed = true;
                outcome.output = normalize_output(output).to_string();
                match compare::compare(output, &audit.expected, &outcome.operator) {
                    Ok(matched) => outcome.matched = matched,
                    Err(err) => outcome.error = Some(AuditError::from(&err)),
                }
            }
            Err(err) => {
                outcome.executed = ran_before_failing(err.code);
                outcome.error = Some(err);
            }
        }

        log_outcome(&outcome);
        outcome
    }
}

fn log_outcome(outcome: &ComparisonOutcome) {
    let audit = outcome.name.as_str();
    match &outcome.error {
        Some(err) => error!(
            audit,
            code = err.code.as_str(),
            executed = outcome.executed,
            position = outcome.fail_position,
            "{}: {}",
            err.label(),
            err.message
        ),
        None if outcome.matched => info!(audit, "output is as expected"),
        None => warn!(
            audit,
            operator = %outcome.operator,
            expected = %outcome.expected,
            actual = %outcome.output,
            "output is not as expected"
        ),
    }
}
