//! Purpose: Layered configuration lookup for per-library loader settings.
//! Exports: `Properties`, `lib_path_key`, `lib_tmpdir_key`.
//! Role: Single read path for `{name}.lib.path`, `{name}.lib.tmpdir`, and the system search path.
//! Invariants: Explicit values always win over the process environment.
//! Invariants: Environment lookup is opt-in (`from_env`) so tests stay hermetic.
use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::platform::search_path_var;

pub fn lib_path_key(base_name: &str) -> String {
    format!("{base_name}.lib.path")
}

pub fn lib_tmpdir_key(base_name: &str) -> String {
    format!("{base_name}.lib.tmpdir")
}

#[derive(Clone, Debug, Default)]
pub struct Properties {
    values: HashMap<String, String>,
    use_env: bool,
}

impl Properties {
    /// Explicit values only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit values layered over the process environment.
    pub fn from_env() -> Self {
        Self {
            values: HashMap::new(),
            use_env: true,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        if self.use_env {
            return std::env::var_os(key).map(|value| value.to_string_lossy().into_owned());
        }
        None
    }

    /// `{name}.lib.path`, ignoring empty values.
    pub fn lib_path(&self, base_name: &str) -> Option<PathBuf> {
        self.get(&lib_path_key(base_name))
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    /// `{name}.lib.tmpdir`, else the host temp directory.
    pub fn tmp_dir(&self, base_name: &str) -> PathBuf {
        self.get(&lib_tmpdir_key(base_name))
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Entries of the host dynamic-library search path, in order, empties skipped.
    pub fn system_search_path(&self) -> Vec<PathBuf> {
        match self.get(search_path_var()) {
            Some(value) => std::env::split_paths(&value)
                .filter(|entry| !entry.as_os_str().is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}
