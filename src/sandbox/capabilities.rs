//! The host capability table.
//!
//! Every function a script can call is a method on [`HostCapabilities`].
//! The script front end only marshals arguments and errors; all behavior
//! lives here, behind typed entry points that take the current
//! [`ExecutionContext`] explicitly.

use super::context::{CALL_COMPARE_PRESET, CALL_CONTAINS_PRESET, ExecutionContext};
use crate::artifacts::ArtifactStore;
use crate::console::ConsolePrinter;
use crate::error_codes::{AuditError, ErrorCode};
use crate::executor::{ExecutionError, Executor};
use crate::pipeline::{self, PipelineStep};
use crate::platform::{self, SettingError, SettingScope};
use crate::whitelist::Whitelist;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Names under which host capabilities are exposed to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Call,
    Shell,
    CallCompare,
    CallContains,
    PrintToConsole,
    PrintToLog,
    QueryPlatformSetting,
    /// `regQuery(fullPath, value)`, kept for existing audit files.
    RegQuery,
}

impl Capability {
    pub const ALL: [Self; 8] = [
        Self::Call,
        Self::Shell,
        Self::CallCompare,
        Self::CallContains,
        Self::PrintToConsole,
        Self::PrintToLog,
        Self::QueryPlatformSetting,
        Self::RegQuery,
    ];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Shell => "shell",
            Self::CallCompare => "callCompare",
            Self::CallContains => "callContains",
            Self::PrintToConsole => "printToConsole",
            Self::PrintToLog => "printToLog",
            Self::QueryPlatformSetting => "queryPlatformSetting",
            Self::RegQuery => "regQuery",
        }
    }

    /// Whether this platform registers the capability.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        match self {
            Self::QueryPlatformSetting | Self::RegQuery => platform::SUPPORTS_SETTINGS,
            _ => true,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.name() == name)
    }

    /// Capabilities registered on this platform.
    #[must_use]
    pub fn available() -> Vec<Self> {
        Self::ALL.into_iter().filter(Self::is_available).collect()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Levels accepted by `printToLog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Fail,
    Error,
}

impl FromStr for LogLevel {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            "WARN" => Ok(Self::Warn),
            "FAIL" => Ok(Self::Fail),
            "ERROR" => Ok(Self::Error),
            _ => Err(AuditError::new(
                ErrorCode::InvalidLogLevel,
                format!("invalid log level: {s}"),
            )),
        }
    }
}

/// Typed entry points for every script-visible capability.
pub trait HostCapabilities {
    /// Run `text` as a whitelisted pipeline and capture its output.
    fn call(&self, cx: &mut ExecutionContext, text: &str) -> Result<(), AuditError>;

    /// Run `text` as one opaque shell invocation.
    fn shell(&self, cx: &mut ExecutionContext, text: &str) -> Result<(), AuditError>;

    /// [`call`](Self::call), then test the output for exact equality.
    fn call_compare(
        &self,
        cx: &mut ExecutionContext,
        text: &str,
        expected: &str,
    ) -> Result<bool, AuditError> {
        cx.set_output(CALL_COMPARE_PRESET);
        self.call(cx, text)?;
        let matched = cx.output() == Some(expected);
        debug!(audit = cx.audit_name(), matched, "callCompare");
        Ok(matched)
    }

    /// [`call`](Self::call), then test whether the output contains `expected`.
    fn call_contains(
        &self,
        cx: &mut ExecutionContext,
        text: &str,
        expected: &str,
    ) -> Result<bool, AuditError> {
        cx.set_output(CALL_CONTAINS_PRESET);
        self.call(cx, text)?;
        let matched = cx.output().is_some_and(|out| out.contains(expected));
        debug!(audit = cx.audit_name(), matched, "callContains");
        Ok(matched)
    }

    fn print_to_console(&self, cx: &mut ExecutionContext, text: &str) -> Result<(), AuditError>;

    fn print_to_log(
        &self,
        cx: &mut ExecutionContext,
        text: &str,
        level: &str,
    ) -> Result<(), AuditError>;

    /// Read one value from the platform settings store.
    fn query_platform_setting(
        &self,
        cx: &mut ExecutionContext,
        scope: &str,
        path: &str,
        value: &str,
    ) -> Result<String, AuditError>;
}

impl From<ExecutionError> for AuditError {
    fn from(err: ExecutionError) -> Self {
        match &err {
            ExecutionError::Spawn { program, .. } => {
                Self::new(ErrorCode::SpawnFailed, err.to_string())
                    .add_context("shell", program.as_str())
            }
            ExecutionError::StepFailed {
                position,
                command,
                stderr,
            } => Self::new(ErrorCode::CommandFailed, err.to_string())
                .add_context("position", *position)
                .add_context("command", command.as_str())
                .add_context("stderr", stderr.as_str()),
            ExecutionError::HostRefused { stderr } => {
                Self::new(ErrorCode::HostRefused, stderr.as_str())
            }
            ExecutionError::ExitStatus { command } => {
                Self::new(ErrorCode::CommandFailed, err.to_string())
                    .add_context("command", command.as_str())
            }
        }
    }
}

impl From<SettingError> for AuditError {
    fn from(err: SettingError) -> Self {
        let code = match &err {
            SettingError::ScopeNotFound => ErrorCode::SettingScopeNotFound,
            SettingError::ValueNotFound(_) => ErrorCode::SettingValueNotFound,
            SettingError::Spawn(_) => ErrorCode::SpawnFailed,
        };
        Self::new(code, err.to_string())
    }
}

/// Capabilities backed by the real host: whitelist, shell and artifact
/// directory.
#[derive(Debug)]
pub struct HostBridge {
    whitelist: Rc<Whitelist>,
    executor: Executor,
    artifacts: ArtifactStore,
    printer: ConsolePrinter,
}

impl HostBridge {
    #[must_use]
    pub fn new(whitelist: Rc<Whitelist>, executor: Executor, artifacts: ArtifactStore) -> Self {
        Self {
            whitelist,
            executor,
            artifacts,
            printer: ConsolePrinter::default(),
        }
    }

    /// Route `printToConsole` through `printer`.
    pub fn with_printer(mut self, printer: ConsolePrinter) -> Self {
        self.printer = printer;
        self
    }

    /// Persist the first step's artifact. Failures are logged only.
    fn capture_first_step(&self, cx: &mut ExecutionContext, step: &PipelineStep) {
        if cx.artifacts_suppressed() {
            debug!(audit = cx.audit_name(), "artifact suppressed");
            return;
        }
        let saved = match &step.file_path {
            Some(path) => self
                .artifacts
                .copy_file(cx.audit_name(), path, cx.redaction())
                .map_err(|err| err.to_string()),
            None => self
                .executor
                .run_step(step)
                .map_err(|err| err.to_string())
                .and_then(|raw| {
                    self.artifacts
                        .write_bytes(cx.audit_name(), &raw, cx.redaction())
                        .map_err(|err| err.to_string())
                }),
        };
        match saved {
            Ok(path) => cx.push_artifact(path),
            Err(reason) => error!(audit = cx.audit_name(), %reason, "cannot save artifact"),
        }
    }
}

impl HostCapabilities for HostBridge {
    fn call(&self, cx: &mut ExecutionContext, text: &str) -> Result<(), AuditError> {
        let steps = pipeline::parse(cx.audit_name(), text).map_err(|err| {
            AuditError::new(ErrorCode::InvalidPipeline, err.to_string())
        })?;
        info!(
            audit = cx.audit_name(),
            "{} separated into: {}",
            cx.audit_name(),
            pipeline::describe(&steps)
        );

        let mut accumulator = std::mem::take(&mut cx.pipeline);
        let built = pipeline::build(steps, &self.whitelist, &mut accumulator);
        let first = accumulator.first_step().cloned();
        cx.pipeline = accumulator;

        if let Some(step) = &first {
            self.capture_first_step(cx, step);
        }

        if let Err(rejected) = built {
            warn!(
                audit = cx.audit_name(),
                position = rejected.position,
                command = %rejected.command,
                status = "FAIL",
                "wrapper failed on position {}",
                rejected.position + 1
            );
            cx.set_fail_position(rejected.position);
            return Err(AuditError::new(ErrorCode::UnknownCommand, rejected.to_string())
                .add_context("position", rejected.position));
        }

        match self.executor.run_pipeline(&cx.pipeline) {
            Ok(output) => {
                cx.set_output(output);
                Ok(())
            }
            Err(err) => {
                if let ExecutionError::StepFailed { position, .. } = &err {
                    cx.set_fail_position(*position);
                }
                Err(err.into())
            }
        }
    }

    fn shell(&self, cx: &mut ExecutionContext, text: &str) -> Result<(), AuditError> {
        let output = self.executor.run_raw(text)?;
        cx.set_output(output.clone());

        if cx.artifacts_suppressed() {
            return Ok(());
        }
        match self.artifacts.write_text(cx.audit_name(), &output, cx.redaction()) {
            Ok(path) => {
                cx.push_artifact(path);
                Ok(())
            }
            Err(err) => {
                error!(audit = cx.audit_name(), command = text, "cannot save artifact: {err}");
                Err(AuditError::new(ErrorCode::ArtifactNotSaved, err.to_string()))
            }
        }
    }

    fn print_to_console(&self, _cx: &mut ExecutionContext, text: &str) -> Result<(), AuditError> {
        self.printer.println(text);
        Ok(())
    }

    fn print_to_log(
        &self,
        cx: &mut ExecutionContext,
        text: &str,
        level: &str,
    ) -> Result<(), AuditError> {
        let audit = cx.audit_name();
        match level.parse::<LogLevel>()? {
            LogLevel::Info => info!(audit, "{text}"),
            LogLevel::Debug => debug!(audit, "{text}"),
            LogLevel::Warn => warn!(audit, "{text}"),
            LogLevel::Fail => warn!(audit, status = "FAIL", "{text}"),
            LogLevel::Error => error!(audit, "{text}"),
        }
        Ok(())
    }

    fn query_platform_setting(
        &self,
        cx: &mut ExecutionContext,
        scope: &str,
        path: &str,
        value: &str,
    ) -> Result<String, AuditError> {
        if !platform::SUPPORTS_SETTINGS {
            return Err(AuditError::new(
                ErrorCode::CapabilityNotFound,
                format!(
                    "{} is not available on {}",
                    Capability::QueryPlatformSetting,
                    platform::current_os()
                ),
            ));
        }
        let setting = platform::query_setting(SettingScope::from_prefix(scope), path, value)?;
        cx.set_output(setting.clone());

        if !cx.artifacts_suppressed() {
            match self.artifacts.write_text(cx.audit_name(), &setting, cx.redaction()) {
                Ok(saved) => cx.push_artifact(saved),
                Err(err) => error!(audit = cx.audit_name(), "cannot save artifact: {err}"),
            }
        }
        Ok(setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditSpec;
    use crate::executor::testing::ScriptedRunner;
    use crate::executor::ShellSpec;
    use tempfile::TempDir;

    fn bridge(runner: ScriptedRunner, dir: &TempDir) -> HostBridge {
        HostBridge::new(
            Rc::new(Whitelist::with_builtins()),
            Executor::with_runner(ShellSpec::new("sh", "-c"), Box::new(runner)),
            ArtifactStore::new(dir.path()),
        )
    }

    fn context(name: &str) -> ExecutionContext {
        ExecutionContext::for_audit(&AuditSpec::new(name, "ignored"))
    }

    #[test]
    fn capability_names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(Capability::from_name(cap.name()), Some(cap));
        }
        assert_eq!(Capability::from_name("rm"), None);
    }

    #[test]
    fn settings_capabilities_follow_platform() {
        let available = Capability::available();
        assert!(available.contains(&Capability::Call));
        assert_eq!(
            available.contains(&Capability::QueryPlatformSetting),
            cfg!(windows)
        );
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("FAIL".parse::<LogLevel>().unwrap(), LogLevel::Fail);
        let err = "verbose".parse::<LogLevel>().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLogLevel);
        assert_eq!(err.label(), "invalid log level");
    }

    #[test]
    fn call_sets_output_and_saves_first_step_artifact() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::default().respond("echo hallo", "hallo\n", "");
        let host = bridge(runner, &tmp);
        let mut cx = context("greeting");

        host.call(&mut cx, "echo hallo").unwrap();
        assert_eq!(cx.output(), Some("hallo"));
        assert_eq!(cx.artifacts().len(), 1);
        let saved = std::fs::read_to_string(tmp.path().join("artifacts/greeting.txt")).unwrap();
        assert_eq!(saved, "hallo\n");
    }

    #[test]
    fn call_rejects_unknown_command_without_artifact() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::default();
        let calls = runner.calls.clone();
        let host = bridge(runner, &tmp);
        let mut cx = context("bad");

        let err = host.call(&mut cx, "notacommand").unwrap_err();
        assert_eq!(err.label(), "unknown command");
        assert_eq!(cx.fail_position(), Some(0));
        assert!(cx.artifacts().is_empty());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn call_keeps_first_artifact_when_later_step_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::default().respond("ls", "a\nb\n", "");
        let host = bridge(runner, &tmp);
        let mut cx = context("listing");

        let err = host.call(&mut cx, "ls | notacommand").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownCommand);
        assert_eq!(cx.fail_position(), Some(1));
        assert!(tmp.path().join("artifacts/listing.txt").exists());
    }

    #[test]
    fn call_reports_failing_step() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::default()
            .respond("ls", "a\n", "")
            .respond("ls | cat /nope", "", "cat: /nope: missing\n");
        let host = bridge(runner, &tmp);
        let mut cx = context("failing");

        let err = host.call(&mut cx, "ls | cat /nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandFailed);
        assert_eq!(err.message, "cat failed");
        assert_eq!(cx.fail_position(), Some(1));
    }

    #[test]
    fn suppressed_artifacts_are_not_written() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default().respond("echo x", "x\n", ""), &tmp);
        let mut audit = AuditSpec::new("quiet", "echo x");
        audit.dont_save_artifact = true;
        let mut cx = ExecutionContext::for_audit(&audit);

        host.call(&mut cx, "echo x").unwrap();
        host.shell(&mut cx, "echo x").unwrap();
        assert!(!tmp.path().join("artifacts").exists());
    }

    #[test]
    fn shell_stderr_is_host_refused() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default().respond("net user", "", "Access denied\n"), &tmp);
        let mut cx = context("users");

        let err = host.shell(&mut cx, "net user").unwrap_err();
        assert_eq!(err.code, ErrorCode::HostRefused);
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn shell_bypasses_whitelist_and_writes_trimmed_artifact() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default().respond("curl -s x", "body \n", ""), &tmp);
        let mut cx = context("raw");

        host.shell(&mut cx, "curl -s x").unwrap();
        assert_eq!(cx.output(), Some("body"));
        let saved = std::fs::read_to_string(tmp.path().join("artifacts/raw.txt")).unwrap();
        assert_eq!(saved, "body");
    }

    #[test]
    fn call_compare_and_contains() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default().respond("echo hallo", "hallo\n", ""), &tmp);
        let mut cx = context("cmp");

        assert!(host.call_compare(&mut cx, "echo hallo", "hallo").unwrap());
        assert!(!host.call_compare(&mut cx, "echo hallo", "hall").unwrap());
        assert!(host.call_contains(&mut cx, "echo hallo", "all").unwrap());
        assert!(!host.call_contains(&mut cx, "echo hallo", "xyz").unwrap());
    }

    #[test]
    fn call_compare_failure_leaves_preset_output() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default(), &tmp);
        let mut cx = context("cmp");
        cx.set_output("stale");

        assert!(host.call_compare(&mut cx, "notacommand", "stale").is_err());
        assert_eq!(cx.output(), Some(CALL_COMPARE_PRESET));
    }

    #[test]
    fn print_to_log_rejects_unknown_level() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default(), &tmp);
        let mut cx = context("log");
        assert!(host.print_to_log(&mut cx, "hello", "fail").is_ok());
        let err = host.print_to_log(&mut cx, "hello", "LOUD").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidLogLevel);
    }

    #[cfg(not(windows))]
    #[test]
    fn platform_setting_is_unavailable_off_windows() {
        let tmp = TempDir::new().unwrap();
        let host = bridge(ScriptedRunner::default(), &tmp);
        let mut cx = context("reg");
        let err = host
            .query_platform_setting(&mut cx, "HKLM:", "SOFTWARE", "x")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CapabilityNotFound);
    }

    #[test]
    fn execution_errors_map_to_codes() {
        let err: AuditError = ExecutionError::HostRefused {
            stderr: "nope".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::HostRefused);
        let err: AuditError = SettingError::ValueNotFound("EnableLUA".into()).into();
        assert_eq!(err.message, "value not found: EnableLUA");
        assert_eq!(err.label(), "value not found");
    }
}
