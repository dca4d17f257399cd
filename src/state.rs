//! Script execution state
//!
//! Holds mutable per-test state: working directory, environment variables
//! and the execution log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Mutable state for a single test execution
pub struct State {
    /// Initial working directory (fixtures copied here)
    pub workdir: PathBuf,
    /// Current working directory (changed by `cd`)
    pub pwd: PathBuf,
    /// Environment variables, ordered for deterministic subprocess env
    env: Vec<(String, String)>,
    /// key → position in `env`
    env_index: HashMap<String, usize>,
    /// Execution log
    pub log: String,
}

impl State {
    /// Create a new State with the given working directory, inheriting the
    /// environment of the current process.
    pub fn new(workdir: PathBuf) -> Self {
        let pwd = workdir.clone();
        let mut state = Self {
            workdir,
            pwd,
            env: Vec::new(),
            env_index: HashMap::new(),
            log: String::new(),
        };

        for (key, value) in std::env::vars() {
            state.setenv(key, value);
        }
        let pwd = state.pwd.to_string_lossy().to_string();
        state.setenv("PWD", pwd);

        state
    }

    /// Set an environment variable.
    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(&idx) = self.env_index.get(&key) {
            self.env[idx].1 = value;
        } else {
            self.env_index.insert(key.clone(), self.env.len());
            self.env.push((key, value));
        }
    }

    /// All environment variables, for the subprocess.
    pub fn environ(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve a path relative to the current working directory, cleaning
    /// `.` and `..` lexically.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            clean_path(p)
        } else {
            clean_path(&self.pwd.join(path))
        }
    }

    /// Change the current working directory. Also updates `PWD`.
    pub fn chdir(&mut self, dir: &str) -> Result<(), std::io::Error> {
        let new_pwd = self.resolve_path(dir);
        if !new_pwd.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory not found: {}", new_pwd.display()),
            ));
        }
        let pwd_str = new_pwd.to_string_lossy().to_string();
        self.pwd = new_pwd;
        self.setenv("PWD", pwd_str);
        Ok(())
    }

    /// Write a log entry
    pub fn logf(&mut self, msg: &str) {
        self.log.push_str(msg);
        if !msg.ends_with('\n') {
            self.log.push('\n');
        }
    }
}

/// Clean a path by resolving `.` and `..` components lexically.
///
/// Unlike `canonicalize()`, this does not require the path to exist on disk.
fn clean_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut components = Vec::new();
    let mut has_root = false;
    let mut prefix: Option<Component> = None;

    for component in path.components() {
        match component {
            Component::RootDir => {
                has_root = true;
                components.clear();
            }
            Component::Prefix(_) => {
                prefix = Some(component);
                components.clear();
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // '..' at the root is dropped
                match components.last() {
                    Some(Component::Normal(_)) => {
                        components.pop();
                    }
                    _ if !has_root => components.push(component),
                    _ => {}
                }
            }
            Component::Normal(_) => components.push(component),
        }
    }

    if components.is_empty() && !has_root && prefix.is_none() {
        return PathBuf::from(".");
    }

    let mut result = PathBuf::new();
    if let Some(p) = prefix {
        result.push(p);
    }
    if has_root {
        result.push(std::path::MAIN_SEPARATOR.to_string());
    }
    for c in &components {
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean_path(Path::new("")), PathBuf::from("."));
        #[cfg(unix)]
        assert_eq!(clean_path(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    fn getenv<'a>(state: &'a State, key: &str) -> Option<&'a str> {
        state.environ().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_setenv_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::new(dir.path().to_path_buf());
        state.setenv("TESH_TEST_VAR", "one");
        state.setenv("TESH_TEST_VAR", "two");
        assert_eq!(getenv(&state, "TESH_TEST_VAR"), Some("two"));
        assert_eq!(state.environ().filter(|(k, _)| *k == "TESH_TEST_VAR").count(), 1);
    }

    #[test]
    fn test_chdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut state = State::new(dir.path().to_path_buf());

        state.chdir("sub").unwrap();
        assert_eq!(state.pwd, dir.path().join("sub"));
        assert_eq!(getenv(&state, "PWD"), dir.path().join("sub").to_str());

        state.chdir("..").unwrap();
        assert_eq!(state.pwd, dir.path());

        assert!(state.chdir("missing").is_err());
        assert_eq!(state.pwd, dir.path());
    }

    #[test]
    fn test_logf_terminates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = State::new(dir.path().to_path_buf());
        state.logf("one");
        state.logf("two\n");
        assert_eq!(state.log, "one\ntwo\n");
    }
}
