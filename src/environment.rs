// src/environment.rs

//! Snapshot of the process environment
//!
//! Tool overrides, proxies and `PKG_CONFIG_PATH` are all read from the
//! environment. Reading them through an explicit snapshot keeps resolution
//! deterministic and lets tests inject values without touching the real
//! process environment (which is not thread-safe to mutate).

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Separator used by PATH-like variables on this platform
pub const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// An immutable set of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// An empty environment
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current process environment
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Builder-style insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.vars.remove(key);
    }

    /// Value of a variable; empty values count as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// First set variable among `keys`
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Split a PATH-like variable into its entries
    pub fn get_paths(&self, key: &str) -> Vec<PathBuf> {
        self.get(key)
            .map(|v| {
                v.split(PATH_LIST_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Join paths into a PATH-like value
pub fn join_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> String {
    paths
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(&PATH_LIST_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_unset() {
        let env = Environment::empty().with("MAKE", "").with("CMAKE", "cmake3");
        assert_eq!(env.get("MAKE"), None);
        assert_eq!(env.get("CMAKE"), Some("cmake3"));
        assert_eq!(env.get_any(&["MAKE", "CMAKE"]), Some("cmake3"));
    }

    #[test]
    fn test_path_round_trip() {
        let sep = PATH_LIST_SEPARATOR;
        let env = Environment::empty().with("PKG_CONFIG_PATH", format!("/a{sep}{sep}/b"));
        let paths = env.get_paths("PKG_CONFIG_PATH");
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(join_paths(&paths), format!("/a{sep}/b"));
    }
}
