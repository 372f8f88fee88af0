// src/recipe/kitchen/mod.rs

//! Kitchen: where recipes are cooked
//!
//! The Kitchen owns everything shared between recipes:
//! - the directory layout (temp dirs, install prefixes, archive cache)
//! - the downloader and its network settings
//! - the command runner, stamp store and cmake generator detector
//! - the environment snapshot tools and proxies are read from
//!
//! Every recipe-specific piece of state lives under the recipe's own
//! directories, so one Kitchen can cook several recipes from different
//! threads.

mod archive;
mod config;
mod cook;
mod runner;
mod stamp;
mod tools;

pub use config::{CookResult, KitchenConfig};
pub use cook::Cook;
pub use runner::{CommandRunner, Invocation, ProcessRunner, unescape};
pub use stamp::{
    FileStampStore, MemoryStampStore, StampStore, Step, StepCheck, StepOutcome, StepStamp,
    StepTracker, fingerprint,
};
pub use tools::{
    CmakeHelpDetector, FixedGenerator, GeneratorDetector, Platform, ToolResolver,
    parse_default_generator,
};

use crate::environment::Environment;
use crate::error::Result;
use crate::fetch::Downloader;
use crate::flags::activation_env;
use crate::recipe::format::Recipe;
use crate::recipe::paths::RecipePaths;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    environment: Environment,
    downloader: Downloader,
    runner: Arc<dyn CommandRunner>,
    stamps: Arc<dyn StampStore>,
    generator: Arc<dyn GeneratorDetector>,
}

impl Kitchen {
    /// Create a Kitchen reading tools and proxies from the process environment
    pub fn new(config: KitchenConfig) -> Result<Self> {
        Self::with_environment(config, Environment::from_process())
    }

    /// Create a Kitchen with an explicit environment snapshot
    pub fn with_environment(config: KitchenConfig, environment: Environment) -> Result<Self> {
        let downloader = Downloader::new(config.fetch.clone(), &environment)?;
        Ok(Self {
            config,
            environment,
            downloader,
            runner: Arc::new(ProcessRunner),
            stamps: Arc::new(FileStampStore),
            generator: Arc::new(CmakeHelpDetector),
        })
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(KitchenConfig::default())
    }

    /// Route build commands through `runner`
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Keep stamps in `store` instead of `<tmp>/<step>.stamp` files
    pub fn with_stamp_store(mut self, store: Arc<dyn StampStore>) -> Self {
        self.stamps = store;
        self
    }

    /// Override how cmake's default generator is detected
    pub fn with_generator_detector(mut self, detector: Arc<dyn GeneratorDetector>) -> Self {
        self.generator = detector;
        self
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Derived paths for `recipe`
    pub fn paths(&self, recipe: &Recipe) -> Result<RecipePaths> {
        RecipePaths::new(&self.config.work_root, &self.config.target, recipe)
    }

    /// Tool selection for `recipe`
    pub fn tools<'a>(&'a self, recipe: &'a Recipe) -> ToolResolver<'a> {
        ToolResolver::new(
            &self.environment,
            &recipe.options,
            self.config.platform,
            &recipe.host,
        )
    }

    /// Start cooking `recipe` step by step
    pub fn prepare<'a>(&'a self, recipe: &'a Recipe) -> Result<Cook<'a>> {
        Cook::new(self, recipe)
    }

    /// Cook a recipe: download, extract, patch, configure, compile, install
    ///
    /// Steps whose stamps are still valid are skipped, so cooking an
    /// unchanged recipe twice runs nothing the second time.
    pub fn cook(&self, recipe: &Recipe) -> Result<CookResult> {
        info!("Cooking {} version {}", recipe.name, recipe.version);

        let result = self.prepare(recipe)?.run_all()?;

        info!(
            "Cooked {} into {} ({} step(s) ran)",
            result.recipe,
            result.install_path.display(),
            result.executed().len()
        );
        Ok(result)
    }

    /// Fetch and verify sources for a recipe without building
    ///
    /// # Returns
    /// The cached archive paths, in recipe order.
    pub fn fetch(&self, recipe: &Recipe) -> Result<Vec<PathBuf>> {
        info!("Fetching sources for {} version {}", recipe.name, recipe.version);
        let mut cook = self.prepare(recipe)?;
        cook.download()?;
        Ok(cook.archive_paths())
    }

    /// Whether `recipe` is installed and nothing that shaped the install changed
    pub fn is_cooked(&self, recipe: &Recipe) -> Result<bool> {
        self.prepare(recipe)?.is_installed()
    }

    /// `PATH`, `CPATH` and `LIBRARY_PATH` with the recipe's prefix prepended
    pub fn activation_env(&self, recipe: &Recipe) -> Result<BTreeMap<String, String>> {
        let paths = self.paths(recipe)?;
        Ok(activation_env(&paths, &self.environment))
    }
}
