//! End-to-end audits against the real host shell.
//!
//! Every audit here goes through the full path: script preparation, the
//! sandbox, whitelist validation, `sh -c` execution, artifact capture and
//! comparison. The shell is `sh` so the tests only run on Unix.

#![cfg(unix)]

use hostaudit::config::AuditSpec;
use hostaudit::console::Console;
use hostaudit::engine::Engine;
use hostaudit::executor::{Executor, ShellSpec};
use hostaudit::report::{ComparisonOutcome, JsonResultWriter};
use hostaudit::whitelist::Whitelist;
use regex::Regex;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn engine(output: &Path) -> Engine {
    Engine::with_executor(
        Executor::new(ShellSpec::new("sh", "-c")),
        Whitelist::with_builtins(),
        output,
    )
    .expect("engine starts")
}

fn run(audit: &AuditSpec) -> (ComparisonOutcome, TempDir) {
    let tmp = TempDir::new().unwrap();
    let outcome = engine(tmp.path()).run_audit(audit);
    (outcome, tmp)
}

// =============================================================================
// Matching
// =============================================================================

#[test]
fn echo_matches_expected_value() {
    let (outcome, tmp) = run(&AuditSpec::new("greeting", "echo hallo").expecting("==", "hallo"));
    assert!(outcome.executed);
    assert!(outcome.matched);
    assert_eq!(
        fs::read_to_string(tmp.path().join("artifacts/greeting.txt")).unwrap(),
        "hallo\n"
    );
}

#[test]
fn echo_mismatch_is_reported() {
    let (outcome, _tmp) = run(&AuditSpec::new("greeting", "echo hallo").expecting("==", "hall"));
    assert!(outcome.executed);
    assert!(!outcome.matched);
    assert_eq!(outcome.output, "hallo");
    assert!(outcome.error.is_none());
}

#[test]
fn numeric_comparison() {
    let (outcome, _tmp) = run(&AuditSpec::new("count", "echo 42").expecting(">", "41"));
    assert!(outcome.matched);
}

#[test]
fn pipeline_output_is_last_step() {
    let (outcome, _tmp) = run(
        &AuditSpec::new("piped", "echo alpha beta | grep -o beta").expecting("==", "beta"),
    );
    assert!(outcome.executed, "{:?}", outcome.error);
    assert!(outcome.matched, "got {:?}", outcome.output);
}

#[test]
fn contains_reg_operator() {
    let (outcome, _tmp) = run(
        &AuditSpec::new("kernel", "uname -s").expecting("containsReg", "^[A-Za-z]+"),
    );
    assert!(outcome.matched);
}

// =============================================================================
// Whitelist and execution failures
// =============================================================================

#[test]
fn unknown_command_is_not_executed() {
    let (outcome, tmp) = run(&AuditSpec::new("bad", "notacommand"));
    assert!(!outcome.executed);
    assert_eq!(outcome.error_label(), Some("unknown command"));
    assert!(!tmp.path().join("artifacts").join("bad.txt").exists());
}

#[test]
fn rejected_second_step_keeps_first_artifact() {
    let (outcome, tmp) = run(&AuditSpec::new("listing", "ls | notacommand"));
    assert!(!outcome.executed);
    assert_eq!(outcome.fail_position, Some(1));
    assert_eq!(outcome.error_label(), Some("unknown command"));
    assert!(tmp.path().join("artifacts/listing.txt").exists());
}

#[test]
fn failing_step_is_located() {
    let (outcome, _tmp) = run(&AuditSpec::new("missing", "ls | cat /nonexistent/file"));
    assert!(!outcome.executed);
    assert_eq!(outcome.fail_position, Some(1));
    let err = outcome.error.expect("error recorded");
    assert_eq!(err.label(), "command failed");
    assert_eq!(err.message, "cat failed");
}

#[test]
fn shell_refusal_keeps_host_message() {
    let (outcome, _tmp) = run(&AuditSpec::new("raw", "shell('echo oops 1>&2')"));
    assert!(!outcome.executed);
    let entry = outcome.to_entry();
    assert_eq!(entry.error_message.as_deref(), Some("oops"));
    assert_eq!(entry.error_code, Some("AUD-3002"));
}

#[test]
fn shell_bypasses_whitelist() {
    let (outcome, tmp) = run(&AuditSpec::new("raw", "shell('printf raw')").expecting("==", "raw"));
    assert!(outcome.matched);
    assert_eq!(
        fs::read_to_string(tmp.path().join("artifacts/raw.txt")).unwrap(),
        "raw"
    );
}

// =============================================================================
// Artifacts
// =============================================================================

#[test]
fn file_reference_is_copied_and_redacted() {
    let input = TempDir::new().unwrap();
    let source = input.path().join("sshd_config");
    fs::write(&source, "PermitRootLogin no\nPassword secret123\n").unwrap();

    let mut audit = AuditSpec::new(
        "sshd",
        format!("grep PermitRootLogin §file§{}", source.display()),
    )
    .expecting("contains", "no");
    audit.redaction = Some(Regex::new("secret[0-9]+").unwrap());

    let (outcome, tmp) = run(&audit);
    assert!(outcome.matched, "{:?}", outcome.error);
    let copied = fs::read_to_string(tmp.path().join("artifacts/sshd_config")).unwrap();
    assert!(copied.contains("Password REDACTED"));
    assert!(!copied.contains("secret123"));
}

#[test]
fn suppressed_artifacts_are_not_written() {
    let mut audit = AuditSpec::new("quiet", "echo hallo").expecting("==", "hallo");
    audit.dont_save_artifact = true;
    let (outcome, tmp) = run(&audit);
    assert!(outcome.matched);
    assert!(outcome.artifacts.is_empty());
    assert!(!tmp.path().join("artifacts/quiet.txt").exists());
}

// =============================================================================
// Whole runs
// =============================================================================

#[test]
fn run_writes_result_document() {
    let tmp = TempDir::new().unwrap();
    let audits = vec![
        AuditSpec::new("greeting", "echo hallo").expecting("==", "hallo"),
        AuditSpec::new("bad", "notacommand"),
        AuditSpec::new("script", "callCompare('echo x', 'x') ? 'yes' : 'no'").expecting("==", "x"),
    ];
    let mut writer = JsonResultWriter::new(tmp.path(), "./linux.json");
    let summary = engine(tmp.path())
        .run(&audits, &mut writer, &Console::silent())
        .unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.matched, 2);

    let text = fs::read_to_string(tmp.path().join("result.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let entries = doc["./linux.json"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["Output is as expected"], true);
    assert_eq!(entries[1]["Command was executed"], false);
    assert_eq!(entries[1]["Error-Message"], "unknown command");
    assert_eq!(entries[2]["Output is as expected"], true);
}
