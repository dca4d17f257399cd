//! emx-tesh: golden-file tests for command-line programs
//!
//! # Overview
//!
//! A `.tesh` script mixes commentary, shell commands and the output each
//! command is expected to produce. Every command runs through the system
//! shell in a fresh working directory; its stderr, stdout and exit code are
//! compared with the recorded expectations. In update mode, mismatches are
//! written back to the script instead of failing.
//!
//! # Script Syntax
//!
//! ```text
//! # create and read
//! $ echo "hi" > f
//! $ cat f
//! >hi
//!
//! 1$ cat missing
//! 2>cat: missing: No such file or directory
//! ```
//!
//! | Line      | Meaning                                              |
//! |-----------|------------------------------------------------------|
//! | `# text`  | Comment, attached to the command right below it      |
//! | `$ cmd`   | Command expected to exit with 0                      |
//! | `N$ cmd`  | Command expected to exit with `N`                    |
//! | `<text`   | Line fed to the command's stdin                      |
//! | `>text`   | Expected stdout line                                 |
//! | `2>text`  | Expected stderr line                                 |
//! | `>text\`  | Last line, without a trailing newline                |
//!
//! `cd <dir>` is built in and changes the working directory of the
//! following commands.
//!
//! # Templates
//!
//! Commands and data are expanded before each run: `{{working-dir}}` is the
//! current directory, `{{match "[0-9]+"}}` marks a regex island in expected
//! output and `{{sh "cmd"}}` substitutes the output of a shell command. See
//! [`template`] for the full syntax.

mod ast;
mod engine;
mod error;
mod matcher;
mod parser;
mod process;
mod report;
mod runner;
mod scanner;
mod state;
pub mod template;

pub use ast::{CommandNode, CommentNode, DataNode, Node, SpacerNode, Stream, Suite, Test};
pub use engine::{apply_updates, Correction, Engine, EngineConfig, TestOutcome, Update};
pub use error::{AssertError, ErrorKind, ParseError, RunError, TemplateError};
pub use matcher::{matches, RegexRegistry};
pub use parser::{build, parse_test};
pub use process::{Output, ShellCommand};
pub use report::{NoopReporter, Reporter};
pub use runner::{TestRunner, RunConfig, TestResult, TestCaseResult, TestRunnerBuilder};
pub use scanner::{scan, Line, ScannedLine};
pub use state::State;
pub use template::{Context, Expander};

// Convenience functions for cargo test integration
pub use runner::{run_and_assert, run_and_assert_with, run};
