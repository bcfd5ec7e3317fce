//! Splits command text into pipeline steps.
//!
//! Tokenization is plain whitespace splitting. Quotes are not interpreted,
//! so `grep "a b"` yields the tokens `grep`, `"a`, `b"`; they are rejoined
//! with single spaces when the shell line is built.

use super::{FILE_MARKER, PIPE_TOKEN, PipelineStep};
use std::fmt;

/// Command text that does not form a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No tokens at all.
    Empty,
    /// Text starts with the pipe token.
    LeadingPipe,
    /// Text ends with the pipe token.
    TrailingPipe,
    /// Two pipe tokens with nothing between them.
    EmptySegment { position: usize },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty pipeline"),
            Self::LeadingPipe => write!(f, "pipeline starts with '|'"),
            Self::TrailingPipe => write!(f, "pipeline ends with '|'"),
            Self::EmptySegment { position } => {
                write!(f, "empty pipeline step at position {position}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Parse `text` into ordered steps owned by `audit_name`.
///
/// A text with `n` standalone `|` tokens yields `n + 1` steps.
pub fn parse(audit_name: &str, text: &str) -> Result<Vec<PipelineStep>, PipelineError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    match (tokens.first(), tokens.last()) {
        (None, _) | (_, None) => return Err(PipelineError::Empty),
        (Some(&PIPE_TOKEN), _) => return Err(PipelineError::LeadingPipe),
        (_, Some(&PIPE_TOKEN)) => return Err(PipelineError::TrailingPipe),
        _ => {}
    }

    tokens
        .split(|token| *token == PIPE_TOKEN)
        .enumerate()
        .map(|(position, segment)| {
            if segment.is_empty() {
                Err(PipelineError::EmptySegment { position })
            } else {
                Ok(make_step(audit_name, position, segment))
            }
        })
        .collect()
}

/// Build a step from a non-empty segment.
///
/// The first token carrying [`FILE_MARKER`] ends the argument list; tokens
/// after it are dropped.
fn make_step(audit_name: &str, position: usize, segment: &[&str]) -> PipelineStep {
    let marker = segment
        .iter()
        .position(|token| token.starts_with(FILE_MARKER));

    let (args, file_path) = match marker {
        Some(index) => (
            segment.get(1..index).unwrap_or_default(),
            Some(segment[index][FILE_MARKER.len()..].to_string()),
        ),
        None => (&segment[1..], None),
    };

    PipelineStep {
        command: segment[0].to_string(),
        args: args.iter().map(ToString::to_string).collect(),
        file_path,
        audit_name: audit_name.to_string(),
        position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command_yields_one_step() {
        let steps = parse("a", "echo hallo").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].command, "echo");
        assert_eq!(steps[0].args, vec!["hallo"]);
        assert_eq!(steps[0].file_path, None);
        assert_eq!(steps[0].audit_name, "a");
    }

    #[test]
    fn pipes_split_in_order() {
        let steps = parse("a", "cat /etc/passwd | grep root | wc -l").unwrap();
        let commands: Vec<_> = steps.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(commands, vec!["cat", "grep", "wc"]);
        let positions: Vec<_> = steps.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn pipe_inside_word_is_not_a_separator() {
        let steps = parse("a", "grep a|b file").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].args, vec!["a|b", "file"]);
    }

    #[test]
    fn extra_whitespace_is_ignored() {
        let steps = parse("a", "   ls\t-la   |\n  grep   x  ").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].args, vec!["-la"]);
        assert_eq!(steps[1].args, vec!["x"]);
    }

    #[test]
    fn file_marker_becomes_file_path() {
        let steps = parse("a", "grep root §file§/etc/passwd").unwrap();
        assert_eq!(steps[0].args, vec!["root"]);
        assert_eq!(steps[0].file_path.as_deref(), Some("/etc/passwd"));
    }

    #[test]
    fn tokens_after_file_marker_are_dropped() {
        let steps = parse("a", "grep -i §file§/etc/hosts ignored trailing | wc").unwrap();
        assert_eq!(steps[0].args, vec!["-i"]);
        assert_eq!(steps[0].file_path.as_deref(), Some("/etc/hosts"));
        assert_eq!(steps[1].command, "wc");
    }

    #[test]
    fn windows_style_file_path() {
        let steps = parse("a", r"type §file§C:\Windows\win.ini").unwrap();
        assert!(steps[0].args.is_empty());
        assert_eq!(steps[0].file_path.as_deref(), Some(r"C:\Windows\win.ini"));
    }

    #[test]
    fn empty_text_fails() {
        assert_eq!(parse("a", ""), Err(PipelineError::Empty));
        assert_eq!(parse("a", "   \n\t"), Err(PipelineError::Empty));
    }

    #[test]
    fn leading_and_trailing_pipes_fail() {
        assert_eq!(parse("a", "| ls"), Err(PipelineError::LeadingPipe));
        assert_eq!(parse("a", "ls |"), Err(PipelineError::TrailingPipe));
        assert_eq!(parse("a", "|"), Err(PipelineError::LeadingPipe));
    }

    #[test]
    fn consecutive_pipes_fail() {
        assert_eq!(
            parse("a", "ls | | grep x"),
            Err(PipelineError::EmptySegment { position: 1 })
        );
    }

    #[test]
    fn quotes_are_not_interpreted() {
        let steps = parse("a", r#"grep "a b" file"#).unwrap();
        assert_eq!(steps[0].args, vec![r#""a"#, r#"b""#, "file"]);
    }
}
