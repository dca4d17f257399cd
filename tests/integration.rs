//! Integration test: run `.tesh` scripts via cargo test
//!
//! Runs every script under `tests/testdata/`, each in a fresh working
//! directory seeded from `tests/fixtures/`.
//!
//! Usage:
//!   cargo test --test integration                  # run all
//!   TESH_VERBOSE=1 cargo test --test integration   # verbose
//!
//! Environment variables:
//!   TESH_VERBOSE=1  print the execution log of every script
//!   TESH_WORK=1     preserve working directories
//!   TESH_UPDATE=1   rewrite failing expectations

use std::path::PathBuf;

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

#[cfg(unix)]
#[test]
fn tesh_all() {
    let root = manifest_dir();
    emx_tesh::run_and_assert_with(root.join("tests/testdata"), |config| {
        config.fixture_dir = Some(root.join("tests/fixtures"));
        config.vars.set("project", "emx-tesh");
    });
}
