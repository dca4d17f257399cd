//! Update mode on real files: rewriting and convergence

#![cfg(unix)]

use std::path::{Path, PathBuf};
use emx_tesh::{run, TestResult};

const DRIFTED: &str = "\
# Expectations that no longer hold
$ echo hello
>goodbye

$ printf 'partial'

3$ echo failed >&2; exit 1
2>{{match \"fail.*\"}}

# unchanged
$ echo same
>same
";

const CORRECTED: &str = "\
# Expectations that no longer hold
$ echo hello
>hello

$ printf 'partial'
>partial\\

1$ echo failed >&2; exit 1
2>{{match \"fail.*\"}}

# unchanged
$ echo same
>same
";

fn suite(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("drift.tesh");
    std::fs::write(&file, content).unwrap();
    (dir, file)
}

fn run_suite(dir: &Path, update: bool) -> TestResult {
    run(dir).update(update).run().unwrap()
}

#[test]
fn update_rewrites_only_mismatches() {
    let (dir, file) = suite(DRIFTED);

    let result = run_suite(dir.path(), true);
    assert!(result.all_passed(), "{:?}", result.cases);
    assert_eq!(result.updated_count(), 1);
    assert_eq!(result.verdict(), "UPDATED 1 on 1 tests");
    assert_eq!(std::fs::read_to_string(&file).unwrap(), CORRECTED);
}

#[test]
fn update_converges() {
    let (dir, file) = suite(DRIFTED);

    run_suite(dir.path(), true);
    let result = run_suite(dir.path(), true);
    assert_eq!(result.updated_count(), 0);
    assert_eq!(result.verdict(), "PASSED 1 tests");
    assert_eq!(std::fs::read_to_string(&file).unwrap(), CORRECTED);

    let result = run_suite(dir.path(), false);
    assert!(result.all_passed(), "{:?}", result.cases);
}

#[test]
fn without_update_the_file_is_untouched() {
    let (dir, file) = suite(DRIFTED);

    let result = run_suite(dir.path(), false);
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.updated_count(), 0);
    assert_eq!(result.verdict(), "FAILED 1 on 1 tests");
    assert_eq!(
        result.cases[0].error.as_deref(),
        Some("expected on stdout: `goodbye\n` got: `hello\n`"),
    );
    assert_eq!(std::fs::read_to_string(&file).unwrap(), DRIFTED);
}

#[test]
fn execution_errors_are_not_updated() {
    let (dir, file) = suite("$ echo before\n$ cd missing-dir\n$ echo after\n>after\n");

    let result = run(dir.path()).update(true).run().unwrap();
    assert_eq!(result.failed_count(), 1);
    assert!(result.cases[0].error.as_deref().unwrap_or("").contains("failed to execute `cd missing-dir`"));
    // The mismatch before the failure is still recorded
    assert_eq!(result.updated_count(), 1);
    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "$ echo before\n>before\n$ cd missing-dir\n$ echo after\n>after\n",
    );
    assert_eq!(result.verdict(), "FAILED 1 on 1 tests");
}

#[test]
fn update_converges_for_carriage_returns() {
    let (dir, file) = suite("$ printf 'a\\r\\nb\\r\\n'\n>a\n");

    let result = run_suite(dir.path(), true);
    assert_eq!(result.updated_count(), 1);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "$ printf 'a\\r\\nb\\r\\n'\n>a\r\n>b\r\n");

    let result = run_suite(dir.path(), true);
    assert_eq!(result.updated_count(), 0);
    assert_eq!(result.verdict(), "PASSED 1 tests");
}

#[test]
fn output_lines_ending_in_backslash_are_not_recorded() {
    let source = "$ printf 'C:\\\\\\\\\\n'\n>wrong\n";
    let (dir, file) = suite(source);

    let result = run_suite(dir.path(), true);
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.updated_count(), 0);
    assert!(result.cases[0].log.contains("cannot record stdout"), "{}", result.cases[0].log);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), source);
}
