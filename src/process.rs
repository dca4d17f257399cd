//! Shell process runner
//!
//! Runs one command line through the system shell (`sh -c` on Unix,
//! `cmd /C` on Windows) and captures its streams in full.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;
use crate::error::RunError;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A command line to run through the shell
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
    dir: Option<PathBuf>,
    stdin: String,
    env: Option<Vec<(String, String)>>,
    path_prepend: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            dir: None,
            stdin: String::new(),
            env: None,
            path_prepend: None,
            timeout: None,
        }
    }

    /// Working directory of the process
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Content fed to the process's stdin. Empty means no input.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = input.into();
        self
    }

    /// Replace the inherited environment
    pub fn environ<'a>(mut self, vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.env = Some(vars.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        self
    }

    /// Search this directory before the rest of `PATH`
    pub fn path_prepend(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prepend = Some(dir.into());
        self
    }

    /// Kill the process if it runs longer than `timeout`
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn build(&self) -> Result<ProcessCommand, RunError> {
        #[cfg(windows)]
        let mut cmd = {
            let mut c = ProcessCommand::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut c = ProcessCommand::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };

        if let Some(ref dir) = self.dir {
            cmd.current_dir(dir);
        }

        if let Some(ref vars) = self.env {
            cmd.env_clear();
            for (k, v) in vars {
                cmd.env(k, v);
            }
        }

        if let Some(ref dir) = self.path_prepend {
            let base = match self.env {
                Some(ref vars) => vars.iter()
                    .find(|(k, _)| k == "PATH")
                    .map(|(_, v)| OsString::from(v)),
                None => std::env::var_os("PATH"),
            }.unwrap_or_default();
            let path = prepend_path(dir, &base)
                .map_err(|e| RunError::execution(&self.command, e))?;
            cmd.env("PATH", path);
        }

        // Own process group, so a timeout can take down the whole tree
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let stdin = if self.stdin.is_empty() { Stdio::null() } else { Stdio::piped() };
        cmd.stdin(stdin);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        Ok(cmd)
    }

    /// Run the command to completion.
    ///
    /// A non-zero exit status is a normal [`Output`]; only a process that
    /// cannot be started, read or waited on (or that times out) is an error.
    pub fn run(&self) -> Result<Output, RunError> {
        let mut child = self.build()?.spawn()
            .map_err(|e| RunError::execution(&self.command, e.to_string()))?;

        // Feed stdin and drain both pipes concurrently so a chatty process
        // can never block on a full pipe.
        let writer = child.stdin.take().map(|mut pipe| {
            let input = self.stdin.clone();
            thread::spawn(move || {
                // The process may exit without reading its input.
                let _ = pipe.write_all(input.as_bytes());
            })
        });
        let stdout = child.stdout.take().map(read_to_end);
        let stderr = child.stderr.take().map(read_to_end);

        let status = self.wait(&mut child);

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);

        let status = status?;
        let stdout = stdout.map_err(|e| RunError::execution(&self.command, e))?;
        let stderr = stderr.map_err(|e| RunError::execution(&self.command, e))?;

        Ok(Output {
            // Some shells prepend a stray carriage return.
            stdout: stdout.trim_start_matches('\r').to_string(),
            stderr: stderr.trim_start_matches('\r').to_string(),
            exit_code: exit_code(status),
        })
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RunError> {
        let wait_err = |e: std::io::Error| RunError::execution(&self.command, e.to_string());

        let Some(timeout) = self.timeout else {
            return child.wait().map_err(wait_err);
        };

        if let Some(status) = child.wait_timeout(timeout).map_err(wait_err)? {
            return Ok(status);
        }
        kill_tree(child);
        let _ = child.wait();
        Err(RunError::execution(
            &self.command,
            format!("timed out after {}s", timeout.as_secs_f64()),
        ))
    }
}

/// Kill the shell together with everything it started.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: kill(2) takes no pointers. The group id is the shell's pid,
    // set by `process_group(0)` in `build`.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn read_to_end<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: Option<JoinHandle<std::io::Result<String>>>) -> Result<String, String> {
    match handle {
        None => Ok(String::new()),
        Some(handle) => match handle.join() {
            Ok(Ok(s)) => Ok(s),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("output reader panicked".into()),
        },
    }
}

/// Exit code of a finished process. A process killed by a signal reports
/// `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn prepend_path(dir: &Path, base: &OsString) -> Result<OsString, String> {
    let paths = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(base));
    std::env::join_paths(paths).map_err(|e| e.to_string())
}
