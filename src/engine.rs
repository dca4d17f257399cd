//! Test executor
//!
//! Walks a test tree node by node, threading the working directory through
//! [`State`]. Each command is expanded, run, then checked in a fixed order:
//! stderr, stdout, exit code. The first mismatch stops the test, unless the
//! engine is in update mode, where mismatches are recorded as [`Update`]s
//! and the test keeps going.
//!
//! The tree itself is never mutated. [`apply_updates`] builds the corrected
//! copy that [`Engine::run`] writes back to the source file.

use std::time::Duration;
use crate::ast::{CommandNode, DataNode, Node, Stream, Test};
use crate::error::{AssertError, RunError};
use crate::matcher::{self, RegexRegistry};
use crate::process::{Output, ShellCommand};
use crate::report::Reporter;
use crate::state::State;
use crate::template::{Context, Expander};

/// Executor settings, shared by every test of a run
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Record mismatches instead of failing
    pub update: bool,
    /// Variables available to templates, besides `working-dir`
    pub vars: Context,
    /// Per-command time limit, none by default
    pub timeout: Option<Duration>,
    /// Extra environment for every command
    pub env: Vec<(String, String)>,
}

/// A correction to one expectation of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    /// Replace the expected content of stdout or stderr
    Data { stream: Stream, content: String },
    ExitCode(i32),
}

/// A correction recorded in update mode, for the node at `node`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub node: usize,
    pub correction: Correction,
}

/// What happened when a test ran
#[derive(Debug, Default)]
pub struct TestOutcome {
    /// The error that stopped the test
    pub error: Option<RunError>,
    /// Corrections recorded in update mode
    pub updates: Vec<Update>,
    /// Whether the source file was rewritten
    pub updated: bool,
    /// Number of commands run, including the failing one
    pub executed: usize,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// The test executor
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a test, then in update mode write the corrected tree back to
    /// its source file.
    pub fn run(&self, test: &Test, state: &mut State, reporter: &mut dyn Reporter) -> TestOutcome {
        let mut outcome = self.execute(test, state, reporter);
        if !self.config.update || outcome.updates.is_empty() {
            return outcome;
        }

        let updated = apply_updates(test, &outcome.updates);
        match updated.write() {
            Ok(()) => {
                state.logf(&format!("[updated {} expectation(s)]", outcome.updates.len()));
                outcome.updated = true;
                reporter.on_update_test(&updated);
            }
            Err(e) => {
                state.logf(&format!("[failed to write {}: {}]", test.name, e));
                if outcome.error.is_none() {
                    outcome.error = Some(RunError::Io(e));
                }
            }
        }
        outcome
    }

    /// Execute a test without touching its source file.
    pub fn execute(&self, test: &Test, state: &mut State, reporter: &mut dyn Reporter) -> TestOutcome {
        reporter.on_start_test(test);
        for (key, value) in &self.config.env {
            state.setenv(key.as_str(), value.as_str());
        }

        let mut outcome = TestOutcome::default();
        for (index, node) in test.children.iter().enumerate() {
            match node {
                Node::Spacer(_) => {}
                Node::Comment(comment) => {
                    state.logf(&comment.dump());
                    reporter.on_comment(test, &comment.content);
                }
                Node::Command(cmd) => {
                    reporter.on_start_command(test, cmd, &state.pwd);
                    let result = self.run_command(index, cmd, state, &mut outcome.updates);
                    outcome.executed += 1;
                    reporter.on_finish_command(test, cmd, &state.pwd, result.as_ref().err());
                    if let Err(e) = result {
                        state.logf(&format!("FAIL: {}", e));
                        outcome.error = Some(e);
                        break;
                    }
                }
            }
        }

        reporter.on_finish_test(test, outcome.error.as_ref());
        outcome
    }

    fn run_command(
        &self,
        index: usize,
        cmd: &CommandNode,
        state: &mut State,
        updates: &mut Vec<Update>,
    ) -> Result<(), RunError> {
        if cmd.is_empty() {
            return Err(RunError::execution("", "unexpected empty command"));
        }

        let mut context = self.config.vars.clone();
        context.set_working_dir(&state.pwd);
        let mut registry = RegexRegistry::new();

        if let Some(target) = cmd.cd_target() {
            let mut expander = Expander::new(&context, &mut registry);
            let target = expander.expand(target)?;
            log_warnings(state, expander.take_warnings());

            state.chdir(&target)
                .map_err(|e| RunError::execution(&cmd.cmd, e.to_string()))?;
            state.logf(&format!("> cd {}", state.pwd.display()));
            return Ok(());
        }

        let (command, stdin, stdout, stderr) = {
            let mut expander = Expander::new(&context, &mut registry);
            let expanded = (
                expander.expand(&cmd.cmd)?,
                expander.expand(cmd.expected(Stream::Stdin))?,
                expander.expand(cmd.expected(Stream::Stdout))?,
                expander.expand(cmd.expected(Stream::Stderr))?,
            );
            log_warnings(state, expander.take_warnings());
            expanded
        };

        state.logf(&format!("> {}", command));
        let output = ShellCommand::new(command)
            .current_dir(&state.pwd)
            .path_prepend(&state.pwd)
            .environ(state.environ())
            .stdin(stdin)
            .timeout(self.config.timeout)
            .run()?;
        log_output(state, &output);

        self.check(index, Stream::Stderr, &output.stderr, &stderr, &registry, state, updates)?;
        self.check(index, Stream::Stdout, &output.stdout, &stdout, &registry, state, updates)?;

        if output.exit_code != cmd.exit_code {
            if !self.config.update {
                return Err(AssertError::ExitCode {
                    expected: cmd.exit_code,
                    received: output.exit_code,
                    stderr: output.stderr,
                }.into());
            }
            state.logf(&format!("[update exit code: {} -> {}]", cmd.exit_code, output.exit_code));
            updates.push(Update {
                node: index,
                correction: Correction::ExitCode(output.exit_code),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check(
        &self,
        index: usize,
        stream: Stream,
        actual: &str,
        expected: &str,
        registry: &RegexRegistry,
        state: &mut State,
        updates: &mut Vec<Update>,
    ) -> Result<(), RunError> {
        if matcher::matches(actual, expected, registry)? {
            return Ok(());
        }

        if !self.config.update || !is_representable(actual) {
            if self.config.update {
                state.logf(&format!("[cannot record {}: a line ends with `\\`]", stream));
            }
            return Err(AssertError::Data {
                stream,
                expected: registry.literal(expected),
                received: actual.to_string(),
            }.into());
        }
        state.logf(&format!("[update {}]", stream));
        updates.push(Update {
            node: index,
            correction: Correction::Data { stream, content: actual.to_string() },
        });
        Ok(())
    }
}

/// Build a copy of `test` with every correction applied.
///
/// Recorded output is escaped so it is not expanded as a template on the
/// next run. Empty output removes the stream's data lines.
pub fn apply_updates(test: &Test, updates: &[Update]) -> Test {
    let mut updated = test.clone();
    for update in updates {
        let Some(Node::Command(cmd)) = updated.children.get_mut(update.node) else {
            continue;
        };
        match update.correction {
            Correction::Data { stream, ref content } => {
                *cmd.stream_mut(stream) = if content.is_empty() {
                    None
                } else {
                    Some(DataNode::new(escape_template(content)))
                };
            }
            Correction::ExitCode(code) => cmd.exit_code = code,
        }
    }
    updated
}

/// A line ending in `\\` would read back as a line without newline.
fn is_representable(content: &str) -> bool {
    !content.contains("\\\n")
}

fn escape_template(content: &str) -> String {
    content.replace("{{", "\\{{")
}

fn log_output(state: &mut State, output: &Output) {
    if !output.stdout.is_empty() {
        state.logf(&format!("[stdout]\n{}", output.stdout));
    }
    if !output.stderr.is_empty() {
        state.logf(&format!("[stderr]\n{}", output.stderr));
    }
    if output.exit_code != 0 {
        state.logf(&format!("[exit status {}]", output.exit_code));
    }
}

fn log_warnings(state: &mut State, warnings: Vec<String>) {
    for warning in warnings {
        state.logf(&format!("[warning] {}", warning));
    }
}
