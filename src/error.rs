//! Script errors

use std::fmt;
use similar::TextDiff;
use crate::ast::Stream;

/// The kind of error, regardless of which stage produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed script syntax
    SyntaxError,
    /// A data line with no command to attach to
    StructureError,
    /// Captured stdout/stderr did not match the expectation
    DataMismatch,
    /// Exit status did not match the expectation
    ExitCodeMismatch,
    /// The process could not be run at all
    ExecutionFailed,
    /// Malformed template placeholder
    TemplateError,
    /// Malformed embedded regex
    MatchCompile,
    /// IO error
    Io,
}

// ──────────────────────────────────────────────────────────
// Parse errors
// ──────────────────────────────────────────────────────────

/// Error returned when a script cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based source line
    pub line: Option<usize>,
}

impl ParseError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::SyntaxError, message: msg.into(), line: None }
    }

    pub fn structure(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::StructureError, message: msg.into(), line: None }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

// ──────────────────────────────────────────────────────────
// Assertion errors
// ──────────────────────────────────────────────────────────

/// A mismatch between what a command was expected to do and what it did.
///
/// These are the only errors update mode can correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertError {
    Data {
        stream: Stream,
        expected: String,
        received: String,
    },
    ExitCode {
        expected: i32,
        received: i32,
        stderr: String,
    },
}

impl AssertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssertError::Data { .. } => ErrorKind::DataMismatch,
            AssertError::ExitCode { .. } => ErrorKind::ExitCodeMismatch,
        }
    }

    /// Unified diff of expected vs received data, for display.
    pub fn diff(&self) -> Option<String> {
        match self {
            AssertError::Data { stream, expected, received } => {
                let diff = TextDiff::from_lines(expected.as_str(), received.as_str());
                Some(diff.unified_diff()
                    .header(&format!("expected {}", stream), &format!("received {}", stream))
                    .to_string())
            }
            AssertError::ExitCode { .. } => None,
        }
    }
}

impl fmt::Display for AssertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertError::Data { stream, expected, received } => {
                write!(f, "expected on {}: `{}` got: `{}`", stream, expected, received)
            }
            AssertError::ExitCode { expected, received, stderr } => {
                write!(f, "expected exit code {}, got {}", expected, received)?;
                if !stderr.is_empty() {
                    write!(f, ": stderr: {}", stderr)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AssertError {}

// ──────────────────────────────────────────────────────────
// Template errors
// ──────────────────────────────────────────────────────────

/// A template that failed to parse or render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub message: String,
}

impl TemplateError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template error: {}", self.message)
    }
}

impl std::error::Error for TemplateError {}

// ──────────────────────────────────────────────────────────
// Run errors
// ──────────────────────────────────────────────────────────

/// Anything that stops a test while it executes
#[derive(Debug)]
pub enum RunError {
    Assert(AssertError),
    /// The command could not be run at all
    Execution {
        command: String,
        message: String,
    },
    Template(TemplateError),
    /// An embedded regex failed to compile
    MatchCompile {
        pattern: String,
        source: regex::Error,
    },
    Io(std::io::Error),
}

impl RunError {
    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        RunError::Execution { command: command.into(), message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Assert(e) => e.kind(),
            RunError::Execution { .. } => ErrorKind::ExecutionFailed,
            RunError::Template(_) => ErrorKind::TemplateError,
            RunError::MatchCompile { .. } => ErrorKind::MatchCompile,
            RunError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn as_assertion(&self) -> Option<&AssertError> {
        match self {
            RunError::Assert(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Assert(e) => write!(f, "{}", e),
            RunError::Execution { command, message } => {
                write!(f, "failed to execute `{}`: {}", command, message)
            }
            RunError::Template(e) => write!(f, "{}", e),
            RunError::MatchCompile { source, .. } => write!(f, "{}", source),
            RunError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Assert(e) => Some(e),
            RunError::Template(e) => Some(e),
            RunError::MatchCompile { source, .. } => Some(source),
            RunError::Io(e) => Some(e),
            RunError::Execution { .. } => None,
        }
    }
}

impl From<AssertError> for RunError {
    fn from(e: AssertError) -> Self {
        RunError::Assert(e)
    }
}

impl From<TemplateError> for RunError {
    fn from(e: TemplateError) -> Self {
        RunError::Template(e)
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        RunError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::syntax("unexpected empty command").at_line(3);
        assert_eq!(err.to_string(), "line 3: unexpected empty command");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_exit_code_display_includes_stderr() {
        let err = AssertError::ExitCode { expected: 0, received: 1, stderr: "boom\n".into() };
        assert_eq!(err.to_string(), "expected exit code 0, got 1: stderr: boom\n");

        let err = AssertError::ExitCode { expected: 24, received: 0, stderr: String::new() };
        assert_eq!(err.to_string(), "expected exit code 24, got 0");
    }

    #[test]
    fn test_data_diff() {
        let err = AssertError::Data {
            stream: Stream::Stdout,
            expected: "world\n".into(),
            received: "hello\n".into(),
        };
        let diff = err.diff().unwrap();
        assert!(diff.contains("-world"));
        assert!(diff.contains("+hello"));
        assert_eq!(RunError::from(err).kind(), ErrorKind::DataMismatch);
    }
}
