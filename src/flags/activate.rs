// src/flags/activate.rs

//! Environment for child processes that use an installed prefix

use crate::environment::{Environment, join_paths};
use crate::recipe::RecipePaths;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `PATH`, `CPATH` and `LIBRARY_PATH` with the prefix's existing
/// `bin`, `include` and `lib` directories in front of the current values
pub fn activation_env(paths: &RecipePaths, env: &Environment) -> BTreeMap<String, String> {
    [
        ("PATH", paths.bin_dir()),
        ("CPATH", paths.include_dir()),
        ("LIBRARY_PATH", paths.lib_dir()),
    ]
    .into_iter()
    .map(|(var, dir)| (var.to_string(), prepend_existing(dir, env.get_paths(var))))
    .collect()
}

fn prepend_existing(dir: PathBuf, current: Vec<PathBuf>) -> String {
    let mut entries = Vec::with_capacity(current.len() + 1);
    if dir.is_dir() {
        entries.push(dir);
    }
    for entry in current {
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    join_paths(&entries)
}
