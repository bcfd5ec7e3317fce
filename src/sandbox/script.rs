//! Script text preparation and failure classification.

use super::capabilities::Capability;
use crate::error_codes::{AuditError, ErrorCode};
use crate::whitelist::Whitelist;

/// Normalize an audit's command text into script source.
///
/// Backslashes are doubled, backticks become `\'`, and leading spaces are
/// stripped. When the first token names a whitelisted command the text is
/// wrapped as `call('<text>')`; anything else (including explicit
/// capability calls like `shell(...)`) is evaluated as written.
pub fn prepare(command: &str, whitelist: &Whitelist) -> Result<String, AuditError> {
    let escaped = command.replace('\\', "\\\\").replace('`', "\\'");
    let escaped = escaped.trim_start_matches(' ');

    let Some(first) = escaped.split_whitespace().next() else {
        return Err(AuditError::new(
            ErrorCode::EmptyCommand,
            "cannot execute command",
        ));
    };

    if whitelist.is_allowed(first) {
        Ok(format!("call('{escaped}')"))
    } else {
        Ok(escaped.to_string())
    }
}

/// An exception that escaped script evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    /// Constructor name of the thrown error (`SyntaxError`, ...), if any.
    pub name: Option<String>,
    pub message: String,
    /// Thrown by a host capability rather than by the script itself.
    pub raised_by_host: bool,
}

/// Identifier named by a "not defined" reference error message.
fn undefined_identifier(message: &str) -> Option<&str> {
    let ident = message.trim().strip_suffix(" is not defined")?;
    Some(ident.trim_matches(|c| c == '\'' || c == '"'))
}

/// Turn an uncaught script exception into an audit error.
///
/// Host capability failures never reach this point; they carry their own
/// typed error through the execution context.
#[must_use]
pub fn classify(failure: &ScriptFailure) -> AuditError {
    match failure.name.as_deref() {
        Some("SyntaxError") => AuditError::new(
            ErrorCode::ScriptSyntaxError,
            format!("SyntaxError: {}", failure.message),
        ),
        Some("ReferenceError") => {
            let ident = undefined_identifier(&failure.message).unwrap_or_default();
            match Capability::from_name(ident) {
                Some(cap) if !cap.is_available() => AuditError::new(
                    ErrorCode::CapabilityNotFound,
                    format!("{cap} is not available on this platform"),
                ),
                _ => AuditError::new(
                    ErrorCode::UnknownCommand,
                    format!("Could not find command: {ident}"),
                )
                .add_context("script_message", failure.message.as_str()),
            }
        }
        _ => AuditError::new(ErrorCode::ScriptError, failure.message.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(name: &str, message: &str) -> ScriptFailure {
        ScriptFailure {
            name: Some(name.to_string()),
            message: message.to_string(),
            raised_by_host: false,
        }
    }

    #[test]
    fn whitelisted_command_is_wrapped() {
        let whitelist = Whitelist::with_builtins();
        assert_eq!(
            prepare("echo hallo", &whitelist).unwrap(),
            "call('echo hallo')"
        );
        assert_eq!(
            prepare("   ECHO hallo", &whitelist).unwrap(),
            "call('ECHO hallo')"
        );
    }

    #[test]
    fn capability_calls_are_not_wrapped() {
        let whitelist = Whitelist::with_builtins();
        assert_eq!(
            prepare("shell('net user')", &whitelist).unwrap(),
            "shell('net user')"
        );
        assert_eq!(prepare("notacommand", &whitelist).unwrap(), "notacommand");
    }

    #[test]
    fn backslashes_and_backticks_are_escaped() {
        let whitelist = Whitelist::with_builtins();
        assert_eq!(
            prepare(r"type §file§C:\x.ini", &whitelist).unwrap(),
            r"call('type §file§C:\\x.ini')"
        );
        assert_eq!(
            prepare("grep `root` §file§/etc/passwd", &whitelist).unwrap(),
            r"call('grep \'root\' §file§/etc/passwd')"
        );
    }

    #[test]
    fn empty_command_cannot_execute() {
        let whitelist = Whitelist::with_builtins();
        let err = prepare("    ", &whitelist).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyCommand);
        assert_eq!(err.message, "cannot execute command");
        assert!(prepare("", &whitelist).is_err());
    }

    #[test]
    fn syntax_errors_are_classified() {
        let err = classify(&failure("SyntaxError", "unexpected token in expression"));
        assert_eq!(err.label(), "script syntax error");
    }

    #[test]
    fn unknown_identifiers_are_unknown_commands() {
        let err = classify(&failure("ReferenceError", "'notacommand' is not defined"));
        assert_eq!(err.label(), "unknown command");
        assert_eq!(err.message, "Could not find command: notacommand");

        let err = classify(&failure("ReferenceError", "foo is not defined"));
        assert_eq!(err.message, "Could not find command: foo");
    }

    #[test]
    fn unregistered_capability_is_not_found() {
        let err = classify(&failure(
            "ReferenceError",
            "'queryPlatformSetting' is not defined",
        ));
        if cfg!(windows) {
            assert_eq!(err.code, ErrorCode::UnknownCommand);
        } else {
            assert_eq!(err.label(), "capability not found");
        }
    }

    #[test]
    fn other_errors_are_script_errors() {
        let err = classify(&failure("TypeError", "not a function"));
        assert_eq!(err.label(), "script error");
        assert_eq!(err.message, "not a function");

        let err = classify(&ScriptFailure {
            name: None,
            message: "thrown string".into(),
            raised_by_host: false,
        });
        assert_eq!(err.code, ErrorCode::ScriptError);
    }
}
