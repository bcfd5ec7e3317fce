//! Runs shell lines on the host.
//!
//! A validated [`ShellPipeline`] is executed prefix by prefix: for step `i`
//! the line `step0 | ... | step_i` runs as one shell invocation, so the OS
//! shell does the piping. The first prefix that writes anything to stderr
//! fails the whole pipeline at that step. Otherwise the stdout of the full
//! line, with trailing newlines, carriage returns and spaces removed, is the
//! result.
//!
//! Execution blocks until the process exits. There is no timeout.

use crate::pipeline::{PipelineStep, ShellPipeline};
use std::fmt;
use std::io;
use std::process::Command;
use tracing::{debug, warn};

/// Shell program and the flag that makes it run a command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    pub program: String,
    pub argument: String,
}

impl ShellSpec {
    #[must_use]
    pub fn new(program: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            argument: argument.into(),
        }
    }

    /// `powershell /C` on Windows, `bash -c` elsewhere.
    #[must_use]
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::new("powershell", "/C")
        } else {
            Self::new("bash", "-c")
        }
    }
}

/// Captured streams of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl ProcessOutput {
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Errors from running host commands.
#[derive(Debug)]
pub enum ExecutionError {
    /// The shell process could not be started.
    Spawn { program: String, source: io::Error },
    /// A pipeline step wrote to stderr.
    StepFailed {
        position: usize,
        command: String,
        stderr: String,
    },
    /// A raw shell invocation wrote to stderr.
    HostRefused { stderr: String },
    /// A single step run for its artifact exited unsuccessfully.
    ExitStatus { command: String },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { program, source } => {
                write!(f, "could not start {program}: {source}")
            }
            Self::StepFailed { command, .. } => write!(f, "{command} failed"),
            Self::HostRefused { stderr } => write!(f, "{stderr}"),
            Self::ExitStatus { command } => write!(f, "{command} exited unsuccessfully"),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Something that can run one shell line and capture its streams.
pub trait CommandRunner {
    fn run(&self, shell: &ShellSpec, line: &str) -> Result<ProcessOutput, ExecutionError>;
}

/// Runs lines through `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, shell: &ShellSpec, line: &str) -> Result<ProcessOutput, ExecutionError> {
        let mut command = Command::new(&shell.program);
        command.arg(&shell.argument);
        if cfg!(windows) {
            command.args(line.split_whitespace());
        } else {
            command.arg(line);
        }

        let output = command.output().map_err(|source| ExecutionError::Spawn {
            program: shell.program.clone(),
            source,
        })?;

        Ok(ProcessOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        })
    }
}

/// Remove trailing `\n`, `\r` and spaces, repeatedly.
#[must_use]
pub fn trim_trailing(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r', ' '])
}

/// Executes pipelines and raw shell lines with one configured shell.
pub struct Executor {
    shell: ShellSpec,
    runner: Box<dyn CommandRunner>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

impl Executor {
    #[must_use]
    pub fn new(shell: ShellSpec) -> Self {
        Self::with_runner(shell, Box::new(SystemRunner))
    }

    #[must_use]
    pub fn with_runner(shell: ShellSpec, runner: Box<dyn CommandRunner>) -> Self {
        Self { shell, runner }
    }

    #[must_use]
    pub fn shell(&self) -> &ShellSpec {
        &self.shell
    }

    /// Run a validated pipeline and return its trimmed final stdout.
    pub fn run_pipeline(&self, pipeline: &ShellPipeline) -> Result<String, ExecutionError> {
        let mut last = ProcessOutput::default();
        for (position, step) in pipeline.steps().iter().enumerate() {
            let line = pipeline.prefix(position);
            last = self.runner.run(&self.shell, &line)?;

            if !last.stderr.is_empty() {
                let stderr = trim_trailing(&last.stderr_lossy()).to_string();
                warn!(
                    audit = %step.audit_name,
                    position,
                    command = %step.command,
                    status = "FAIL",
                    "{} failed: {}",
                    step.command,
                    stderr
                );
                return Err(ExecutionError::StepFailed {
                    position,
                    command: step.command.clone(),
                    stderr,
                });
            }
            debug!(
                audit = %step.audit_name,
                position,
                command = %step.command,
                "step executed"
            );
        }
        Ok(trim_trailing(&last.stdout_lossy()).to_string())
    }

    /// Run one step on its own and return its raw stdout.
    pub fn run_step(&self, step: &PipelineStep) -> Result<Vec<u8>, ExecutionError> {
        let output = self.runner.run(&self.shell, &step.shell_fragment())?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(ExecutionError::ExitStatus {
                command: step.command.clone(),
            })
        }
    }

    /// Run `text` as one opaque shell invocation.
    ///
    /// Any stderr output makes this a [`ExecutionError::HostRefused`].
    pub fn run_raw(&self, text: &str) -> Result<String, ExecutionError> {
        let output = self.runner.run(&self.shell, text)?;
        if !output.stderr.is_empty() {
            return Err(ExecutionError::HostRefused {
                stderr: trim_trailing(&output.stderr_lossy()).to_string(),
            });
        }
        Ok(trim_trailing(&output.stdout_lossy()).to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for deterministic executor tests.

    use super::{CommandRunner, ExecutionError, ProcessOutput, ShellSpec};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Answers known lines from a table and records every line it was asked
    /// to run. Unknown lines succeed with empty output.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedRunner {
        responses: HashMap<String, ProcessOutput>,
        pub calls: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub fn respond(mut self, line: &str, stdout: &str, stderr: &str) -> Self {
            self.responses.insert(
                line.to_string(),
                ProcessOutput {
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: stderr.as_bytes().to_vec(),
                    success: stderr.is_empty(),
                },
            );
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, _shell: &ShellSpec, line: &str) -> Result<ProcessOutput, ExecutionError> {
            self.calls.borrow_mut().push(line.to_string());
            Ok(self.responses.get(line).cloned().unwrap_or(ProcessOutput {
                success: true,
                ..ProcessOutput::default()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;
    use crate::pipeline::{build, parse};
    use crate::whitelist::Whitelist;

    fn pipeline(text: &str) -> ShellPipeline {
        let mut pipeline = ShellPipeline::new();
        build(parse("audit", text).unwrap(), &Whitelist::with_builtins(), &mut pipeline).unwrap();
        pipeline
    }

    fn scripted(runner: ScriptedRunner) -> Executor {
        Executor::with_runner(ShellSpec::new("sh", "-c"), Box::new(runner))
    }

    #[test]
    fn trim_trailing_is_repeated() {
        assert_eq!(trim_trailing("abc \r\n \n"), "abc");
        assert_eq!(trim_trailing("  abc"), "  abc");
        assert_eq!(trim_trailing("\n\r "), "");
    }

    #[test]
    fn pipeline_runs_each_prefix_in_order() {
        let runner = ScriptedRunner::default()
            .respond("cat x", "a\nb\n", "")
            .respond("cat x | grep a", "a\n", "");
        let calls = runner.calls.clone();
        let executor = scripted(runner);

        let output = executor.run_pipeline(&pipeline("cat x | grep a")).unwrap();
        assert_eq!(output, "a");
        assert_eq!(*calls.borrow(), vec!["cat x", "cat x | grep a"]);
    }

    #[test]
    fn first_step_with_stderr_aborts() {
        let runner = ScriptedRunner::default()
            .respond("ls", "file\n", "")
            .respond("ls | cat /nope", "", "cat: /nope: No such file\n");
        let calls = runner.calls.clone();
        let executor = scripted(runner);

        let err = executor
            .run_pipeline(&pipeline("ls | cat /nope | grep x"))
            .unwrap_err();
        match err {
            ExecutionError::StepFailed {
                position,
                command,
                stderr,
            } => {
                assert_eq!(position, 1);
                assert_eq!(command, "cat");
                assert_eq!(stderr, "cat: /nope: No such file");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn raw_invocation_with_stderr_is_host_refused() {
        let executor = scripted(ScriptedRunner::default().respond("whatever", "", "denied\r\n"));
        let err = executor.run_raw("whatever").unwrap_err();
        assert!(matches!(&err, ExecutionError::HostRefused { stderr } if stderr == "denied"));
        assert_eq!(err.to_string(), "denied");
    }

    #[test]
    fn step_failed_message_names_command() {
        let err = ExecutionError::StepFailed {
            position: 0,
            command: "ls".into(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "ls failed");
    }

    #[cfg(unix)]
    mod system {
        use super::*;

        fn sh() -> Executor {
            Executor::new(ShellSpec::new("sh", "-c"))
        }

        #[test]
        fn echo_through_real_shell() {
            assert_eq!(sh().run_pipeline(&pipeline("echo hallo")).unwrap(), "hallo");
        }

        #[test]
        fn real_pipe_semantics() {
            let output = sh()
                .run_pipeline(&pipeline("echo alpha,beta | cut -d, -f2"))
                .unwrap();
            assert_eq!(output, "beta");
        }

        #[test]
        fn real_failing_step() {
            let err = sh()
                .run_pipeline(&pipeline("ls | cat /nonexistent/hostaudit"))
                .unwrap_err();
            assert!(matches!(err, ExecutionError::StepFailed { position: 1, .. }));
        }

        #[test]
        fn run_step_returns_raw_stdout() {
            let steps = parse("audit", "echo raw").unwrap();
            assert_eq!(sh().run_step(&steps[0]).unwrap(), b"raw\n");
        }

        #[test]
        fn missing_shell_is_spawn_error() {
            let executor = Executor::new(ShellSpec::new("/nonexistent/shell", "-c"));
            let err = executor.run_raw("echo x").unwrap_err();
            assert!(matches!(err, ExecutionError::Spawn { .. }));
            assert!(std::error::Error::source(&err).is_some());
        }
    }
}
