//! Test runner
//!
//! Orchestrates a suite: discovers `.tesh` files under a directory, gives
//! each test a fresh working directory (optionally seeded from a fixture
//! directory), runs it through the [`Engine`] and collects the results.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use crate::ast::{Suite, Test};
use crate::engine::{Engine, EngineConfig};
use crate::error::AssertError;
use crate::parser::parse_test;
use crate::report::{NoopReporter, Reporter};
use crate::state::State;
use crate::template::Context;

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory containing test scripts, or a single script
    pub dir: PathBuf,
    /// Optional filter, only run tests whose name contains this string
    pub filter: Option<String>,
    /// Copied into every test's working directory
    pub fixture_dir: Option<PathBuf>,
    /// Root directory for temp working directories
    pub workdir_root: Option<PathBuf>,
    /// Preserve working directories after test (for debugging)
    pub preserve_work: bool,
    /// Verbose mode, callers print the execution log of every test
    pub verbose: bool,
    /// File extensions to scan (default: [".tesh"])
    pub extensions: Vec<String>,
    /// Rewrite failing expectations instead of failing
    pub update: bool,
    /// Template variables
    pub vars: Context,
    /// Extra environment for every command
    pub env: Vec<(String, String)>,
    /// Per-command time limit
    pub timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("testdata"),
            filter: None,
            fixture_dir: None,
            workdir_root: None,
            preserve_work: false,
            verbose: false,
            extensions: vec![".tesh".into()],
            update: false,
            vars: Context::new(),
            env: Vec::new(),
            timeout: None,
        }
    }
}

impl RunConfig {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            update: self.update,
            vars: self.vars.clone(),
            timeout: self.timeout,
            env: self.env.clone(),
        }
    }
}

/// Result of running all tests
#[derive(Debug)]
pub struct TestResult {
    /// Individual test case results
    pub cases: Vec<TestCaseResult>,
    /// Total duration
    pub duration: Duration,
}

impl TestResult {
    pub fn total_count(&self) -> usize {
        self.cases.len()
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed).count()
    }

    /// Count tests whose source file was rewritten
    pub fn updated_count(&self) -> usize {
        self.cases.iter().filter(|c| c.updated).count()
    }

    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    /// Format a summary line
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} updated ({}ms)",
            self.passed_count(),
            self.failed_count(),
            self.updated_count(),
            self.duration.as_millis(),
        )
    }

    /// One-word verdict with counts: `PASSED 3 tests`, `UPDATED 1 on 3
    /// tests` or `FAILED 2 on 3 tests`.
    pub fn verdict(&self) -> String {
        let total = self.total_count();
        if self.failed_count() > 0 {
            format!("FAILED {} on {} tests", self.failed_count(), total)
        } else if self.updated_count() > 0 {
            format!("UPDATED {} on {} tests", self.updated_count(), total)
        } else {
            format!("PASSED {} tests", total)
        }
    }
}

/// Result of a single test case
#[derive(Debug)]
pub struct TestCaseResult {
    /// Script path relative to the suite directory
    pub name: String,
    /// Source file path
    pub file: PathBuf,
    pub passed: bool,
    /// Whether the source file was rewritten in update mode
    pub updated: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Execution log
    pub log: String,
    pub duration: Duration,
    /// Working directory (if preserved)
    pub workdir: Option<PathBuf>,
}

/// The test runner
pub struct TestRunner {
    engine: Engine,
    config: RunConfig,
}

impl TestRunner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            engine: Engine::new(config.engine_config()),
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Discover test files in the configured directory
    pub fn discover(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut files = Vec::new();
        let dir = &self.config.dir;

        if !dir.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("test directory not found: {}", dir.display()),
            ));
        }

        if dir.is_file() {
            files.push(dir.clone());
            return Ok(files);
        }

        self.scan_dir(dir, &mut files)?;

        files.sort();
        Ok(files)
    }

    fn scan_dir(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                self.scan_dir(&path, files)?;
            } else if self.is_test_file(&path) {
                if let Some(ref filter) = self.config.filter {
                    if !self.test_name(&path).contains(filter.as_str()) {
                        continue;
                    }
                }
                files.push(path);
            }
        }
        Ok(())
    }

    fn is_test_file(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            self.config.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
        } else {
            false
        }
    }

    /// Display name of a test: its path relative to the suite directory,
    /// with `/` separators.
    pub fn test_name(&self, file: &Path) -> String {
        let relative = match file.strip_prefix(&self.config.dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => Path::new(file.file_name().unwrap_or(file.as_os_str())),
        };
        relative.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Read and parse one script.
    pub fn load_test(&self, file: &Path) -> Result<Test, String> {
        let name = self.test_name(file);
        let data = std::fs::read_to_string(file)
            .map_err(|e| format!("failed to read {}: {}", name, e))?;
        let mut test = parse_test(&data)
            .map_err(|e| format!("failed to parse {}: {}", name, e))?;
        test.name = name;
        test.path = Some(file.to_path_buf());
        Ok(test)
    }

    /// Parse every discovered script. Fails on the first unreadable or
    /// malformed file.
    pub fn load_suite(&self) -> Result<Suite, std::io::Error> {
        let mut suite = Suite::default();
        for file in self.discover()? {
            let test = self.load_test(&file)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            suite.tests.push(test);
        }
        Ok(suite)
    }

    /// Count the number of tests that would be run
    pub fn count_tests(&self) -> Result<usize, std::io::Error> {
        Ok(self.discover()?.len())
    }

    /// Run all discovered tests
    pub fn run_all(&self) -> Result<TestResult, std::io::Error> {
        self.run_all_with(&mut NoopReporter)
    }

    /// Run all discovered tests, reporting progress to `reporter`
    pub fn run_all_with(&self, reporter: &mut dyn Reporter) -> Result<TestResult, std::io::Error> {
        let start = Instant::now();
        let files = self.discover()?;

        let mut cases = Vec::new();
        for file in &files {
            cases.push(self.run_one(file, reporter));
        }

        Ok(TestResult {
            cases,
            duration: start.elapsed(),
        })
    }

    /// Run a single test file
    pub fn run_one(&self, file: &Path, reporter: &mut dyn Reporter) -> TestCaseResult {
        let start = Instant::now();
        let name = self.test_name(file);

        // Phase 1: parse + prepare
        let (test, tmpdir) = match self.prepare_test(file, &name) {
            Ok(pair) => pair,
            Err(error) => {
                return TestCaseResult {
                    name,
                    file: file.to_path_buf(),
                    passed: false,
                    updated: false,
                    error: Some(error),
                    log: String::new(),
                    duration: start.elapsed(),
                    workdir: None,
                };
            }
        };

        // The canonical path, so `{{working-dir}}` matches what `pwd` prints
        let workdir = tmpdir.path().canonicalize()
            .unwrap_or_else(|_| tmpdir.path().to_path_buf());
        let mut state = State::new(workdir);

        // Phase 2: execute
        let outcome = self.engine.run(&test, &mut state, reporter);
        let passed = outcome.passed();
        let error = outcome.error.map(|e| {
            if let Some(diff) = e.as_assertion().and_then(AssertError::diff) {
                state.logf(&diff);
            }
            e.to_string()
        });

        // Preserve workdir if configured
        let preserved_workdir = if self.config.preserve_work {
            let path = tmpdir.path().to_path_buf();
            std::mem::forget(tmpdir); // leak to preserve
            Some(path)
        } else {
            None
        };

        TestCaseResult {
            name,
            file: file.to_path_buf(),
            passed,
            updated: outcome.updated,
            error,
            log: state.log,
            duration: start.elapsed(),
            workdir: preserved_workdir,
        }
    }

    /// Parse the script and create its working directory.
    fn prepare_test(&self, file: &Path, name: &str) -> Result<(Test, tempfile::TempDir), String> {
        let test = self.load_test(file)?;

        let tmpdir = self.create_workdir(name)
            .map_err(|e| format!("failed to create workdir: {}", e))?;

        if let Some(ref fixtures) = self.config.fixture_dir {
            copy_dir(fixtures, tmpdir.path())
                .map_err(|e| format!("failed to copy {}: {}", fixtures.display(), e))?;
        }

        Ok((test, tmpdir))
    }

    fn create_workdir(&self, name: &str) -> Result<tempfile::TempDir, std::io::Error> {
        let prefix = format!("tesh-{}-", name.replace(['/', '\\'], "-"));
        if let Some(ref root) = self.config.workdir_root {
            std::fs::create_dir_all(root)?;
            tempfile::Builder::new()
                .prefix(&prefix)
                .tempdir_in(root)
        } else {
            tempfile::Builder::new()
                .prefix(&prefix)
                .tempdir()
        }
    }
}

/// Recursively copy the contents of `src` into the existing directory `dst`.
fn copy_dir(src: &Path, dst: &Path) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir(&target)?;
            copy_dir(&entry.path(), &target)?;
        } else {
            // fs::copy keeps permission bits, so helper scripts stay executable
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Builder API for convenient test runner construction
pub struct TestRunnerBuilder {
    config: RunConfig,
}

impl TestRunnerBuilder {
    /// Start building a runner for the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            config: RunConfig {
                dir: dir.into(),
                ..Default::default()
            },
        }
    }

    /// Set the test filter pattern
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Copy this directory into every working directory
    pub fn fixture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.fixture_dir = Some(dir.into());
        self
    }

    /// Set the working directory root
    pub fn workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workdir_root = Some(root.into());
        self
    }

    /// Preserve working directories after tests
    pub fn preserve_work(mut self, preserve: bool) -> Self {
        self.config.preserve_work = preserve;
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Set file extensions to scan
    pub fn extensions(mut self, exts: Vec<String>) -> Self {
        self.config.extensions = exts;
        self
    }

    /// Rewrite failing expectations
    pub fn update(mut self, update: bool) -> Self {
        self.config.update = update;
        self
    }

    /// Define a template variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.vars.set(key, value);
        self
    }

    /// Set an environment variable for every command
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.push((key.into(), value.into()));
        self
    }

    /// Kill commands running longer than `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Build and return the runner
    pub fn build(self) -> TestRunner {
        TestRunner::new(self.config)
    }

    /// Build and run all tests
    pub fn run(self) -> Result<TestResult, std::io::Error> {
        self.build().run_all()
    }
}

/// Convenience function: create a runner builder for a directory
pub fn run(dir: impl Into<PathBuf>) -> TestRunnerBuilder {
    TestRunnerBuilder::new(dir)
}

/// Run `.tesh` files and integrate with `#[test]` by panicking on failure.
///
/// `TESH_VERBOSE` prints every log, `TESH_WORK` keeps working directories
/// and `TESH_UPDATE` rewrites failing expectations.
///
/// Usage in cargo tests:
/// ```rust,ignore
/// #[test]
/// fn test_scripts() {
///     emx_tesh::run_and_assert("tests/testdata");
/// }
/// ```
pub fn run_and_assert(dir: impl Into<PathBuf>) {
    run_and_assert_with(dir, |_| {});
}

/// Like `run_and_assert` but allows config customization.
pub fn run_and_assert_with(dir: impl Into<PathBuf>, customize: impl FnOnce(&mut RunConfig)) {
    let mut config = RunConfig {
        dir: dir.into(),
        verbose: std::env::var("TESH_VERBOSE").is_ok(),
        preserve_work: std::env::var("TESH_WORK").is_ok(),
        update: std::env::var("TESH_UPDATE").is_ok(),
        ..Default::default()
    };
    customize(&mut config);
    let verbose = config.verbose;

    let runner = TestRunner::new(config);
    let result = match runner.run_all() {
        Ok(result) => result,
        Err(e) => panic!("failed to run tests: {}", e),
    };

    // Print results
    for case in &result.cases {
        if case.passed {
            let status = if case.updated { "UPDATE" } else { "PASS " };
            eprintln!("{} {} ({}ms)", status, case.name, case.duration.as_millis());
            if verbose {
                for line in case.log.lines() {
                    eprintln!("  {}", line);
                }
            }
        } else {
            eprintln!("FAIL  {}", case.name);
            if let Some(ref err) = case.error {
                eprintln!("  {}", err);
            }
            if !case.log.is_empty() {
                eprintln!("  --- log ---");
                for line in case.log.lines() {
                    eprintln!("  {}", line);
                }
            }
            if let Some(ref wd) = case.workdir {
                eprintln!("  workdir: {}", wd.display());
            }
        }
    }

    eprintln!("\n{}", result.summary());

    if !result.all_passed() {
        panic!("{} test(s) failed", result.failed_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_discover_and_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.tesh", "$ true\n");
        write(dir.path(), "nested/a.tesh", "$ true\n");
        write(dir.path(), "notes.txt", "");

        let runner = TestRunnerBuilder::new(dir.path()).build();
        let names: Vec<String> = runner.discover().unwrap().iter()
            .map(|f| runner.test_name(f))
            .collect();
        assert_eq!(names, vec!["b.tesh", "nested/a.tesh"]);

        let runner = TestRunnerBuilder::new(dir.path()).filter("nested").build();
        assert_eq!(runner.count_tests().unwrap(), 1);
    }

    #[test]
    fn test_single_file_is_named_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "one.tesh", "$ true\n");
        let runner = TestRunnerBuilder::new(&file).build();
        assert_eq!(runner.discover().unwrap(), vec![file.clone()]);
        assert_eq!(runner.test_name(&file), "one.tesh");
    }

    #[test]
    fn test_missing_directory() {
        let err = TestRunnerBuilder::new("/nonexistent/tesh/suite").build().discover().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_load_suite() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.tesh", "$ echo hi\n>hi\n");
        let suite = TestRunnerBuilder::new(dir.path()).build().load_suite().unwrap();
        assert_eq!(suite.dump(), "a.tesh:\n$ echo hi\n>hi\n");

        write(dir.path(), "bad.tesh", "x$ true\n");
        let err = TestRunnerBuilder::new(dir.path()).build().load_suite().unwrap_err();
        assert!(err.to_string().contains("invalid command prefix"));
    }

    #[test]
    fn test_parse_error_fails_only_that_test() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.tesh", ">orphan\n");
        write(dir.path(), "good.tesh", "# nothing to run\n");

        let result = TestRunnerBuilder::new(dir.path()).run().unwrap();
        assert_eq!(result.total_count(), 2);
        assert_eq!(result.failed_count(), 1);
        assert!(result.cases[0].error.as_deref().unwrap_or("").contains("line 1"));
        assert!(result.cases[1].passed);
        assert_eq!(result.verdict(), "FAILED 1 on 2 tests");
    }

    #[cfg(unix)]
    #[test]
    fn test_create_and_read_suite_report() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "create.tesh",
            "# create and read\n$ echo \"hi\" > f\n$ cat f\n>hi\n1$ cat missing\n2>cat: missing: No such file or directory\n",
        );
        let result = TestRunnerBuilder::new(dir.path()).run().unwrap();
        assert_eq!(result.total_count(), 1);
        assert_eq!(result.failed_count(), 0);
        assert_eq!(result.verdict(), "PASSED 1 tests");
    }

    #[cfg(unix)]
    #[test]
    fn test_fixtures_are_copied() {
        use std::os::unix::fs::PermissionsExt;

        let fixtures = tempfile::tempdir().unwrap();
        write(fixtures.path(), "data/input.txt", "from fixture\n");
        let helper = write(fixtures.path(), "greet", "#!/bin/sh\necho \"hello $1\"\n");
        std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o755)).unwrap();

        let suite = tempfile::tempdir().unwrap();
        write(suite.path(), "fixture.tesh", "$ cat data/input.txt\n>from fixture\n$ greet you\n>hello you\n");

        let result = TestRunnerBuilder::new(suite.path())
            .fixture_dir(fixtures.path())
            .run()
            .unwrap();
        assert!(result.all_passed(), "{:?}", result.cases);
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_preserves_workdir_and_logs_diff() {
        let root = tempfile::tempdir().unwrap();
        let suite = tempfile::tempdir().unwrap();
        write(suite.path(), "fail.tesh", "$ echo actual\n>expected\n");

        let result = TestRunnerBuilder::new(suite.path())
            .workdir_root(root.path())
            .preserve_work(true)
            .run()
            .unwrap();
        let case = &result.cases[0];
        assert!(!case.passed);
        assert_eq!(case.error.as_deref(), Some("expected on stdout: `expected\n` got: `actual\n`"));
        assert!(case.log.contains("-expected\n+actual\n"));
        let workdir = case.workdir.as_ref().unwrap();
        assert!(workdir.starts_with(root.path()));
        assert!(workdir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_removes_workdir_unless_kept() {
        let root = tempfile::tempdir().unwrap();
        let suite = tempfile::tempdir().unwrap();
        write(suite.path(), "fail.tesh", "$ touch left-behind
$ echo actual
>expected
");

        let result = TestRunnerBuilder::new(suite.path())
            .workdir_root(root.path())
            .run()
            .unwrap();
        let case = &result.cases[0];
        assert!(!case.passed);
        assert!(case.workdir.is_none());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_env_and_vars() {
        let suite = tempfile::tempdir().unwrap();
        write(suite.path(), "env.tesh", "$ echo \"$TESH_RUNNER_MODE {{target}}\"\n>ci release\n");

        let result = run(suite.path())
            .env("TESH_RUNNER_MODE", "ci")
            .var("target", "release")
            .run()
            .unwrap();
        assert!(result.all_passed(), "{:?}", result.cases);
    }

    #[cfg(unix)]
    #[test]
    fn test_update_mode_counts() {
        let suite = tempfile::tempdir().unwrap();
        let file = write(suite.path(), "drift.tesh", "$ echo new\n>old\n");

        let result = run(suite.path()).update(true).run().unwrap();
        assert_eq!(result.updated_count(), 1);
        assert_eq!(result.verdict(), "UPDATED 1 on 1 tests");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "$ echo new\n>new\n");

        let result = run(suite.path()).update(true).run().unwrap();
        assert_eq!(result.updated_count(), 0);
        assert_eq!(result.verdict(), "PASSED 1 tests");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout() {
        let suite = tempfile::tempdir().unwrap();
        write(suite.path(), "slow.tesh", "$ sleep 5\n");
        let result = run(suite.path()).timeout(Duration::from_millis(200)).run().unwrap();
        assert!(result.cases[0].error.as_deref().unwrap_or("").contains("timed out"));
    }
}
