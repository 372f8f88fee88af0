// src/recipe/kitchen/stamp.rs

//! Step stamps: change-aware memoization of pipeline steps
//!
//! Each step describes itself with a [`StepCheck`]: a fingerprint of its
//! effective configuration plus the files it reads and writes. A step is
//! skipped when its stamp is still valid:
//!
//! - the stamp exists and its fingerprint equals the fresh one
//! - every declared output exists
//! - neither the stamp nor any output is older than any input
//!
//! Running a step first drops its own stamp and every later one, so a
//! re-run of configure always forces compile and install to follow.

use crate::error::{Error, Result};
use crate::hash::sha256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Download,
    Extract,
    Patch,
    Configure,
    Compile,
    Install,
}

impl Step {
    /// All steps in execution order
    pub const ALL: [Step; 6] = [
        Step::Download,
        Step::Extract,
        Step::Patch,
        Step::Configure,
        Step::Compile,
        Step::Install,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Extract => "extract",
            Self::Patch => "patch",
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::Install => "install",
        }
    }

    /// This step and every step after it
    pub fn and_later(self) -> impl Iterator<Item = Step> {
        Self::ALL.into_iter().filter(move |s| *s >= self)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted record of a completed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStamp {
    pub fingerprint: String,
    pub completed_at: DateTime<Utc>,
}

impl StepStamp {
    pub fn now(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            completed_at: Utc::now(),
        }
    }
}

/// Storage for step stamps
///
/// `scope` is the per-recipe temp directory, so one store can serve every
/// recipe a kitchen cooks.
pub trait StampStore: Send + Sync {
    fn load(&self, scope: &Path, step: Step) -> Result<Option<StepStamp>>;
    fn store(&self, scope: &Path, step: Step, stamp: &StepStamp) -> Result<()>;
    fn remove(&self, scope: &Path, step: Step) -> Result<()>;
}

/// Stamps as JSON files at `<scope>/<step>.stamp`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStampStore;

impl FileStampStore {
    pub fn stamp_path(scope: &Path, step: Step) -> PathBuf {
        scope.join(format!("{step}.stamp"))
    }
}

impl StampStore for FileStampStore {
    fn load(&self, scope: &Path, step: Step) -> Result<Option<StepStamp>> {
        let path = Self::stamp_path(scope, step);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // A corrupt stamp only means the step has to run again
        match serde_json::from_str(&content) {
            Ok(stamp) => Ok(Some(stamp)),
            Err(e) => {
                debug!("Ignoring unreadable stamp {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn store(&self, scope: &Path, step: Step, stamp: &StepStamp) -> Result<()> {
        fs::create_dir_all(scope)?;
        let content = serde_json::to_string_pretty(stamp)
            .map_err(|e| Error::Parse(format!("failed to serialize stamp: {e}")))?;
        fs::write(Self::stamp_path(scope, step), content)?;
        Ok(())
    }

    fn remove(&self, scope: &Path, step: Step) -> Result<()> {
        match fs::remove_file(Self::stamp_path(scope, step)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stamps kept in memory for the lifetime of the store
#[derive(Debug, Default)]
pub struct MemoryStampStore {
    stamps: Mutex<HashMap<(PathBuf, Step), StepStamp>>,
}

impl MemoryStampStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(PathBuf, Step), StepStamp>> {
        self.stamps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StampStore for MemoryStampStore {
    fn load(&self, scope: &Path, step: Step) -> Result<Option<StepStamp>> {
        Ok(self.lock().get(&(scope.to_path_buf(), step)).cloned())
    }

    fn store(&self, scope: &Path, step: Step, stamp: &StepStamp) -> Result<()> {
        self.lock().insert((scope.to_path_buf(), step), stamp.clone());
        Ok(())
    }

    fn remove(&self, scope: &Path, step: Step) -> Result<()> {
        self.lock().remove(&(scope.to_path_buf(), step));
        Ok(())
    }
}

/// SHA-256 of the JSON serialization of a step's effective configuration
pub fn fingerprint<T: Serialize>(config: &T) -> Result<String> {
    let json = serde_json::to_vec(config)
        .map_err(|e| Error::Parse(format!("failed to serialize step configuration: {e}")))?;
    Ok(sha256(&json))
}

/// What a step depends on and produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCheck {
    pub fingerprint: String,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl StepCheck {
    /// Fingerprint a step configuration
    pub fn new<T: Serialize>(config: &T) -> Result<Self> {
        Ok(Self {
            fingerprint: fingerprint(config)?,
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.outputs.extend(outputs);
        self
    }
}

/// Whether a step ran or was satisfied by its stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Skipped,
    Executed,
}

/// Decides whether steps of one recipe need to run, and records them
pub struct StepTracker<'a> {
    store: &'a dyn StampStore,
    scope: PathBuf,
}

impl<'a> StepTracker<'a> {
    pub fn new(store: &'a dyn StampStore, scope: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    /// Check whether a valid stamp covers `check`
    pub fn is_done(&self, step: Step, check: &StepCheck) -> Result<bool> {
        let Some(stamp) = self.store.load(&self.scope, step)? else {
            return Ok(false);
        };

        if stamp.fingerprint != check.fingerprint {
            debug!("{} fingerprint changed", step);
            return Ok(false);
        }

        let mut newest_input: Option<DateTime<Utc>> = None;
        for input in &check.inputs {
            match modified(input) {
                Some(time) => newest_input = newest_input.max(Some(time)),
                None => {
                    debug!("{} input {} is missing", step, input.display());
                    return Ok(false);
                }
            }
        }

        if let Some(newest) = newest_input
            && stamp.completed_at < newest
        {
            debug!("{} stamp is older than its inputs", step);
            return Ok(false);
        }

        for output in &check.outputs {
            match modified(output) {
                None => {
                    debug!("{} output {} is missing", step, output.display());
                    return Ok(false);
                }
                Some(time) if newest_input.is_some_and(|newest| time < newest) => {
                    debug!("{} output {} is stale", step, output.display());
                    return Ok(false);
                }
                Some(_) => {}
            }
        }

        Ok(true)
    }

    /// Drop the stamps of `step` and every later step
    pub fn invalidate_from(&self, step: Step) -> Result<()> {
        for later in step.and_later() {
            self.store.remove(&self.scope, later)?;
        }
        Ok(())
    }

    /// Run `action` unless a valid stamp covers `check`
    ///
    /// The stamp is written only when `action` succeeds.
    pub fn run<F>(&self, step: Step, check: &StepCheck, action: F) -> Result<StepOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        if self.is_done(step, check)? {
            debug!("Skipping {} (up to date)", step);
            return Ok(StepOutcome::Skipped);
        }

        self.invalidate_from(step)?;
        action()?;

        debug!("Recording {} stamp {}", step, check.fingerprint);
        self.store
            .store(&self.scope, step, &StepStamp::now(check.fingerprint.clone()))?;
        Ok(StepOutcome::Executed)
    }
}

fn modified(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}
