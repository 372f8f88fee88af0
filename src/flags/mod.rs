// src/flags/mod.rs

//! Compiler and linker flags for consumers of cooked recipes
//!
//! A `BuildEnvironment` accumulates the flags a host build needs to compile
//! against installed prefixes. It is an explicit value owned by the caller;
//! `FlagComposer` borrows it mutably and merges contributions into it:
//!
//! - include paths (`-I`) and library paths (`-L`) are prepended, so the most
//!   recently added prefix wins; a token already present moves to the front
//! - other compiler flags and libraries (`-l`, `-pthread`, ...) are appended,
//!   skipping tokens already present
//! - the pkg-config search path only grows, in first-seen order

mod activate;
pub mod pkgconfig;

pub use activate::activation_env;
pub use pkgconfig::{PackageFlags, PkgConfigFile};

use crate::environment::{Environment, join_paths};
use crate::error::{Error, Result};
use crate::recipe::{Recipe, RecipePaths};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Accumulated flags and package search path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    include_paths: Vec<String>,
    cflags: Vec<String>,
    lib_paths: Vec<String>,
    libs: Vec<String>,
    pkg_config_path: Vec<PathBuf>,
}

impl BuildEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the search path from `PKG_CONFIG_PATH`
    pub fn from_env(env: &Environment) -> Self {
        let mut build_env = Self::new();
        for dir in env.get_paths("PKG_CONFIG_PATH") {
            build_env.add_search_path(dir);
        }
        build_env
    }

    pub fn include_paths(&self) -> &[String] {
        &self.include_paths
    }

    pub fn cflags(&self) -> &[String] {
        &self.cflags
    }

    pub fn lib_paths(&self) -> &[String] {
        &self.lib_paths
    }

    pub fn libs(&self) -> &[String] {
        &self.libs
    }

    pub fn pkg_config_path(&self) -> &[PathBuf] {
        &self.pkg_config_path
    }

    /// Append a pkg-config search directory unless already present
    pub fn add_search_path(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.pkg_config_path.contains(&dir) {
            self.pkg_config_path.push(dir);
        }
    }

    /// Include paths followed by the other compiler flags
    pub fn cflags_string(&self) -> String {
        self.include_paths
            .iter()
            .chain(&self.cflags)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn ldflags_string(&self) -> String {
        self.lib_paths.join(" ")
    }

    pub fn libs_string(&self) -> String {
        self.libs.join(" ")
    }

    /// `CFLAGS`, `LDFLAGS`, `LIBS` and `PKG_CONFIG_PATH` for a host build
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("CFLAGS".to_string(), self.cflags_string());
        vars.insert("LDFLAGS".to_string(), self.ldflags_string());
        vars.insert("LIBS".to_string(), self.libs_string());
        vars.insert(
            "PKG_CONFIG_PATH".to_string(),
            join_paths(&self.pkg_config_path),
        );
        vars
    }

    /// Merge one contribution following the prepend/append policy
    pub fn merge(&mut self, contribution: FlagContribution) {
        prepend(&mut self.include_paths, contribution.include_paths);
        prepend(&mut self.lib_paths, contribution.lib_paths);
        append(&mut self.cflags, contribution.cflags);
        append(&mut self.libs, contribution.libs);
    }
}

fn prepend(existing: &mut Vec<String>, new: Vec<String>) {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + new.len());
    for token in new.into_iter().chain(existing.drain(..)) {
        if !merged.contains(&token) {
            merged.push(token);
        }
    }
    *existing = merged;
}

fn append(existing: &mut Vec<String>, new: Vec<String>) {
    for token in new {
        if !existing.contains(&token) {
            existing.push(token);
        }
    }
}

/// Flags contributed by one prefix or package, sorted into buckets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagContribution {
    pub include_paths: Vec<String>,
    pub cflags: Vec<String>,
    pub lib_paths: Vec<String>,
    pub libs: Vec<String>,
}

impl FlagContribution {
    /// Sort compiler tokens: `-I...` to include paths, the rest to cflags
    pub fn add_cflags<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            let token = token.into();
            if token.starts_with("-I") {
                self.include_paths.push(token);
            } else {
                self.cflags.push(token);
            }
        }
    }

    /// Sort linker tokens: `-L...` to lib paths, the rest to libs
    pub fn add_libs<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            let token = token.into();
            if token.starts_with("-L") {
                self.lib_paths.push(token);
            } else {
                self.libs.push(token);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include_paths.is_empty()
            && self.cflags.is_empty()
            && self.lib_paths.is_empty()
            && self.libs.is_empty()
    }
}

impl From<PackageFlags> for FlagContribution {
    fn from(flags: PackageFlags) -> Self {
        let mut contribution = Self::default();
        contribution.add_cflags(flags.cflags);
        contribution.add_libs(flags.libs);
        contribution
    }
}

/// Merges flags for installed recipes and pkg-config packages
pub struct FlagComposer<'e> {
    env: &'e mut BuildEnvironment,
}

impl<'e> FlagComposer<'e> {
    pub fn new(env: &'e mut BuildEnvironment) -> Self {
        Self { env }
    }

    /// Flags for a plain install prefix
    ///
    /// `-I<prefix>/include` when that directory exists; `-L<prefix>/lib`
    /// and `-l<lib_name>` when `<prefix>/lib` exists.
    pub fn add_prefix(&mut self, lib_name: &str, prefix: &Path) -> FlagContribution {
        let mut contribution = FlagContribution::default();

        let include = prefix.join("include");
        if include.is_dir() {
            contribution
                .include_paths
                .push(format!("-I{}", include.display()));
        }

        let lib = prefix.join("lib");
        if lib.is_dir() {
            contribution.lib_paths.push(format!("-L{}", lib.display()));
            contribution.libs.push(format!("-l{lib_name}"));
        }

        debug!("Flags for {}: {:?}", prefix.display(), contribution);
        self.env.merge(contribution.clone());
        contribution
    }

    /// Flags for a cooked recipe's install prefix
    pub fn add_recipe(&mut self, recipe: &Recipe, paths: &RecipePaths) -> FlagContribution {
        self.add_prefix(recipe.lib_name(), &paths.port)
    }

    /// Flags for one pkg-config package
    ///
    /// `dir` defaults to `<prefix>/lib/pkgconfig` and must hold
    /// `<package>.pc`. It joins the search path before resolution, so
    /// requirements installed alongside resolve too.
    pub fn add_package(
        &mut self,
        package: &str,
        dir: Option<&Path>,
        prefix: &Path,
        static_link: bool,
    ) -> Result<FlagContribution> {
        let dir = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| prefix.join("lib").join("pkgconfig"));
        let pc = dir.join(format!("{package}.pc"));
        if !pc.is_file() {
            return Err(Error::InvalidArgument(format!(
                "pkg-config file {} does not exist",
                pc.display()
            )));
        }

        self.env.add_search_path(&dir);
        let flags = pkgconfig::resolve(package, &self.env.pkg_config_path, static_link)?;
        let contribution = FlagContribution::from(flags);

        debug!("Flags for package {}: {:?}", package, contribution);
        self.env.merge(contribution.clone());
        Ok(contribution)
    }

    /// Flags for several packages from the same directory, in order
    pub fn add_packages(
        &mut self,
        packages: &[&str],
        dir: Option<&Path>,
        prefix: &Path,
        static_link: bool,
    ) -> Result<FlagContribution> {
        let mut combined = FlagContribution::default();
        for package in packages {
            let contribution = self.add_package(package, dir, prefix, static_link)?;
            combined.include_paths.extend(contribution.include_paths);
            combined.cflags.extend(contribution.cflags);
            combined.lib_paths.extend(contribution.lib_paths);
            combined.libs.extend(contribution.libs);
        }
        Ok(combined)
    }
}
