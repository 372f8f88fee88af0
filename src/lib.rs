// src/lib.rs

//! portcook: fetch, verify and build third-party C libraries
//!
//! Cooks source packages into private install prefixes for a host build
//! system that needs to link against them.
//!
//! # Architecture
//!
//! - Recipes: name, version, target host, source files, patches and
//!   configure options, built in code or read from TOML
//! - Kitchen: runs download, extract, patch, configure, compile and install,
//!   skipping steps whose stamps are still valid
//! - Fetch: HTTP(S)/FTP downloads through proxies, digest and OpenPGP
//!   signature verification, a shared archive cache
//! - Flags: compiler and linker flags for installed prefixes and pkg-config
//!   packages, accumulated in an explicit `BuildEnvironment`

pub mod environment;
mod error;
pub mod fetch;
pub mod flags;
pub mod hash;
pub mod recipe;

pub use environment::Environment;
pub use error::{Error, Result};
pub use flags::{BuildEnvironment, FlagComposer, FlagContribution};
pub use hash::{Digest, HashAlgorithm};
pub use recipe::{
    BuildSystem, CookResult, FileSpec, GpgSpec, Kitchen, KitchenConfig, Recipe, RecipeOptions,
    Step,
};
