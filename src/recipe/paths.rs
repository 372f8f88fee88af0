// src/recipe/paths.rs

//! Derived on-disk locations of a recipe
//!
//! ```text
//! <work_root>/tmp/<host>/ports/<name>/<version>/   logs, stamps, sources
//! <target>/<host>/<name>/<version>/                install prefix
//! <target>/archives/                               download cache
//! ```

use crate::error::Result;
use crate::recipe::Step;
use crate::recipe::format::Recipe;
use std::fs;
use std::path::{Path, PathBuf};

/// Every path the kitchen reads or writes for one recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipePaths {
    /// Per-recipe temp directory
    pub tmp: PathBuf,
    /// Install prefix
    pub port: PathBuf,
    /// Archive cache shared by all recipes
    pub archives: PathBuf,
    /// Local source tree, when the recipe builds from one
    pub source_directory: Option<PathBuf>,
    /// Used when the extracted tree holds no directory
    fallback_work: PathBuf,
}

impl RecipePaths {
    /// Derive paths from the kitchen roots; all results are absolute
    pub fn new(work_root: &Path, target: &Path, recipe: &Recipe) -> Result<Self> {
        let work_root = std::path::absolute(work_root)?;
        let target = std::path::absolute(target)?;

        let tmp = work_root
            .join("tmp")
            .join(&recipe.host)
            .join("ports")
            .join(&recipe.name)
            .join(&recipe.version);
        let port = target
            .join(&recipe.host)
            .join(&recipe.name)
            .join(&recipe.version);
        let source_directory = recipe
            .options
            .source_directory
            .as_deref()
            .map(std::path::absolute)
            .transpose()?;

        Ok(Self {
            fallback_work: tmp.join(recipe.full_name()),
            tmp,
            port,
            archives: target.join("archives"),
            source_directory,
        })
    }

    /// Source tree the build runs against
    ///
    /// The local source directory when set; otherwise the first directory
    /// found in the temp dir after extraction, or `<tmp>/<name>-<version>`.
    pub fn work_path(&self) -> PathBuf {
        if let Some(source) = &self.source_directory {
            return source.clone();
        }
        self.extracted_dir().unwrap_or_else(|| self.fallback_work.clone())
    }

    /// Directory configure/make run in
    pub fn build_path(&self) -> PathBuf {
        match &self.source_directory {
            Some(_) => self.tmp.join("build"),
            None => self.work_path(),
        }
    }

    fn extracted_dir(&self) -> Option<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.tmp)
            .ok()?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| p.file_name().is_some_and(|n| n != "build"))
            .collect();
        dirs.sort();
        dirs.into_iter().next()
    }

    /// `<tmp>/<step>.log`
    pub fn log_path(&self, step: Step) -> PathBuf {
        self.tmp.join(format!("{step}.log"))
    }

    pub fn include_dir(&self) -> PathBuf {
        self.port.join("include")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.port.join("lib")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.port.join("bin")
    }

    pub fn pkgconfig_dir(&self) -> PathBuf {
        self.lib_dir().join("pkgconfig")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::format::{FileSpec, RecipeOptions};
    use tempfile::TempDir;

    fn recipe() -> Recipe {
        Recipe::for_host("libfoo", "1.2", "x86_64-linux-gnu")
            .with_file(FileSpec::new("https://example.org/libfoo-1.2.tar.gz"))
    }

    #[test]
    fn test_layout() {
        let root = TempDir::new().unwrap();
        let paths = RecipePaths::new(root.path(), &root.path().join("ports"), &recipe()).unwrap();

        assert_eq!(
            paths.tmp,
            root.path().join("tmp/x86_64-linux-gnu/ports/libfoo/1.2")
        );
        assert_eq!(paths.port, root.path().join("ports/x86_64-linux-gnu/libfoo/1.2"));
        assert_eq!(paths.archives, root.path().join("ports/archives"));
        assert_eq!(paths.log_path(Step::Configure), paths.tmp.join("configure.log"));
        assert_eq!(paths.work_path(), paths.tmp.join("libfoo-1.2"));
    }

    #[test]
    fn test_paths_are_absolute() {
        let paths = RecipePaths::new(Path::new("tmp-root"), Path::new("ports"), &recipe()).unwrap();
        assert!(paths.tmp.is_absolute());
        assert!(paths.port.is_absolute());
    }

    #[test]
    fn test_work_path_discovers_extracted_dir() {
        let root = TempDir::new().unwrap();
        let paths = RecipePaths::new(root.path(), root.path(), &recipe()).unwrap();
        fs::create_dir_all(paths.tmp.join("foo-src")).unwrap();
        fs::write(paths.tmp.join("configure.log"), "").unwrap();

        assert_eq!(paths.work_path(), paths.tmp.join("foo-src"));
        assert_eq!(paths.build_path(), paths.tmp.join("foo-src"));
    }

    #[test]
    fn test_source_directory_builds_out_of_tree() {
        let root = TempDir::new().unwrap();
        let local = recipe().with_options(RecipeOptions {
            source_directory: Some(root.path().join("src")),
            ..RecipeOptions::default()
        });
        let paths = RecipePaths::new(root.path(), root.path(), &local).unwrap();
        assert_eq!(paths.work_path(), root.path().join("src"));
        assert_eq!(paths.build_path(), paths.tmp.join("build"));
    }
}
