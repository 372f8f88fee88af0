// src/recipe/mod.rs

//! Recipes for native source packages
//!
//! A recipe names a versioned source package and says how to fetch, verify,
//! patch, configure, compile and install it into a private prefix.
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification (like a recipe card)
//! - **Kitchen**: Owns the directories, tools and network settings
//! - **Cook**: One recipe going through the kitchen, step by step
//! - **Stamp**: The note left behind once a step is done
//!
//! # Example
//!
//! ```no_run
//! use portcook::recipe::{FileSpec, Kitchen, KitchenConfig, Recipe};
//! use portcook::hash::Digest;
//!
//! let recipe = Recipe::new("libyaml", "0.2.5").with_file(
//!     FileSpec::new("https://pyyaml.org/download/libyaml/yaml-0.2.5.tar.gz")
//!         .with_digest(Digest::sha256(
//!             "c642ae9b75fee120b2d96c712538bd2cf283228d2337df2cf2988e3c02678ef4",
//!         )),
//! );
//!
//! let kitchen = Kitchen::new(KitchenConfig::default())?;
//! let result = kitchen.cook(&recipe)?;
//! println!("installed into {}", result.install_path.display());
//! # Ok::<(), portcook::Error>(())
//! ```

mod format;
mod kitchen;
pub mod parser;
mod paths;

pub use format::{
    BuildSystem, FileSpec, GpgSpec, KeySource, RECIPE_SCHEMA, Recipe, RecipeOptions,
    SignatureSource, build_triple, default_host, same_triple,
};
pub use kitchen::{
    CmakeHelpDetector, CommandRunner, Cook, CookResult, FileStampStore, FixedGenerator,
    GeneratorDetector, Invocation, Kitchen, KitchenConfig, MemoryStampStore, Platform,
    ProcessRunner, StampStore, Step, StepCheck, StepOutcome, StepStamp, StepTracker,
    ToolResolver, fingerprint, parse_default_generator, unescape,
};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use paths::RecipePaths;
