//! emx-tesh CLI
//!
//! Run `.tesh` golden-file tests, or rewrite them with `--update`.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use emx_tesh::{CommandNode, Reporter, RunConfig, RunError, Test, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "emx-tesh")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Run golden-file tests for CLI programs")]
struct Cli {
    /// Directory or file containing the tests
    tests: PathBuf,

    /// Directory copied into the working directory of every test
    working_dir: Option<PathBuf>,

    /// Overwrite failing expectations instead of failing
    #[arg(short, long)]
    update: bool,

    /// Only run tests whose name contains this string
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Verbose output: show the execution log of every test
    #[arg(short, long)]
    verbose: bool,

    /// Keep working directories after test (for debugging)
    #[arg(short = 'k', long = "keep")]
    keep: bool,

    /// Root directory for working directories
    #[arg(long = "workdir")]
    workdir: Option<PathBuf>,

    /// File extensions to match [default: .tesh]
    #[arg(long = "ext", default_value = ".tesh")]
    extensions: Vec<String>,

    /// Environment variables to set (KEY=VALUE)
    #[arg(short = 'e', long = "env", value_parser = parse_key_val)]
    env_vars: Vec<(String, String)>,

    /// Template variables to define (KEY=VALUE)
    #[arg(long = "var", value_parser = parse_key_val)]
    vars: Vec<(String, String)>,

    /// Kill commands running longer than this many seconds
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Show number of tests without running
    #[arg(long = "count")]
    count: bool,

    /// Print the parsed tests back in script syntax without running
    #[arg(long = "dump")]
    dump: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
    }
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    match s.parse::<f64>() {
        Ok(secs) if secs > 0.0 && secs.is_finite() => Ok(Duration::from_secs_f64(secs)),
        _ => Err(format!("expected a positive number of seconds, got `{}`", s)),
    }
}

/// Prints every failing command as it happens
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn on_finish_command(&mut self, test: &Test, cmd: &CommandNode, _pwd: &Path, err: Option<&RunError>) {
        if let Some(err) = err {
            println!("{}:\n$ {}\n{}\n", test.name, cmd.cmd, err);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let fixture_dir = match cli.working_dir {
        Some(ref dir) => Some(
            dir.canonicalize()
                .with_context(|| format!("invalid working directory: {}", dir.display()))?,
        ),
        None => None,
    };

    let config = RunConfig {
        dir: cli.tests.clone(),
        filter: cli.filter,
        fixture_dir,
        workdir_root: cli.workdir,
        preserve_work: cli.keep,
        verbose: cli.verbose,
        extensions: cli.extensions,
        update: cli.update,
        vars: cli.vars.into_iter().collect(),
        env: cli.env_vars,
        timeout: cli.timeout,
    };
    let runner = TestRunner::new(config);
    let verbose = runner.config().verbose;

    if cli.count {
        let count = runner.count_tests()
            .with_context(|| format!("failed to discover tests in {}", cli.tests.display()))?;
        println!("Found {} test(s)", count);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.dump {
        let suite = runner.load_suite()
            .with_context(|| format!("failed to load tests from {}", cli.tests.display()))?;
        print!("{}", suite.dump());
        return Ok(ExitCode::SUCCESS);
    }

    let result = runner.run_all_with(&mut ConsoleReporter)
        .with_context(|| format!("failed to run tests in {}", cli.tests.display()))?;

    for case in &result.cases {
        if case.passed && !verbose {
            continue;
        }
        if case.passed {
            let status = if case.updated { "UPDATE" } else { "PASS " };
            println!("{} {} ({}ms)", status, case.name, case.duration.as_millis());
        } else {
            println!("FAIL  {}", case.name);
            if let Some(ref err) = case.error {
                for line in err.lines() {
                    println!("      {}", line);
                }
            }
        }
        if !case.log.is_empty() {
            println!("      --- log ---");
            for line in case.log.lines() {
                println!("      {}", line);
            }
        }
        if let Some(ref wd) = case.workdir {
            println!("      workdir: {}", wd.display());
        }
    }

    if verbose {
        println!("{}", result.summary());
    }
    println!("{}", result.verdict());

    if result.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
