//! Lifecycle callbacks
//!
//! The executor never prints. Anything human-facing goes through a
//! [`Reporter`], which sees every test, comment and command as it runs.

use std::path::Path;
use crate::ast::{CommandNode, Test};
use crate::error::RunError;

/// Receives lifecycle events while tests run. Every method defaults to a
/// no-op, implement only what you need.
pub trait Reporter {
    fn on_start_test(&mut self, _test: &Test) {}

    /// A standalone comment was reached
    fn on_comment(&mut self, _test: &Test, _comment: &str) {}

    /// `pwd` is the working directory the command runs in
    fn on_start_command(&mut self, _test: &Test, _cmd: &CommandNode, _pwd: &Path) {}

    fn on_finish_command(&mut self, _test: &Test, _cmd: &CommandNode, _pwd: &Path, _err: Option<&RunError>) {}

    fn on_finish_test(&mut self, _test: &Test, _err: Option<&RunError>) {}

    /// The test's source file was rewritten in update mode
    fn on_update_test(&mut self, _test: &Test) {}
}

/// A reporter that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}
