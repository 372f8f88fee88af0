// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use crate::fetch::FetchConfig;
use crate::recipe::Step;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::stamp::StepOutcome;
use super::tools::Platform;

/// Configuration for the Kitchen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitchenConfig {
    /// Root of the per-recipe temp directories (`<work_root>/tmp/...`)
    pub work_root: PathBuf,
    /// Root of install prefixes and the archive cache
    pub target: PathBuf,
    /// Toolchain family used for tool defaults and cmake generators
    pub platform: Platform,
    /// Network settings
    pub fetch: FetchConfig,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            work_root: PathBuf::from("."),
            target: PathBuf::from("ports"),
            platform: Platform::current(),
            fetch: FetchConfig::default(),
        }
    }
}

impl KitchenConfig {
    /// Keep everything under one directory: temp dirs in `<root>/tmp`,
    /// prefixes and archives in `<root>/ports`
    pub fn in_dir(root: &Path) -> Self {
        Self {
            work_root: root.to_path_buf(),
            target: root.join("ports"),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_keyserver(mut self, keyserver: impl Into<String>) -> Self {
        self.fetch.keyserver = keyserver.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.fetch.connect_timeout = connect;
        self.fetch.read_timeout = read;
        self
    }

    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.fetch.max_redirects = max;
        self
    }
}

/// Result of cooking a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookResult {
    /// "name-version" of the recipe
    pub recipe: String,
    /// What happened to each step, in order
    pub steps: Vec<(Step, StepOutcome)>,
    /// Install prefix
    pub install_path: PathBuf,
    /// Verified archives in the cache
    pub archives: Vec<PathBuf>,
}

impl CookResult {
    pub fn outcome(&self, step: Step) -> Option<StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| *outcome)
    }

    /// Steps that actually ran
    pub fn executed(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|(_, outcome)| *outcome == StepOutcome::Executed)
            .map(|(step, _)| *step)
            .collect()
    }
}
