// src/recipe/parser.rs

//! Recipe file parsing
//!
//! ```toml
//! schema = 1
//! patch_files = ["patches/0001-fix-build.patch"]
//!
//! [package]
//! name = "libyaml"
//! version = "0.2.5"
//!
//! [[files]]
//! urls = ["https://pyyaml.org/download/libyaml/yaml-0.2.5.tar.gz"]
//! sha256 = "c642ae9b75fee120b2d96c712538bd2cf283228d2337df2cf2988e3c02678ef4"
//!
//! [configure_options]
//! enable-static = ""
//!
//! [options]
//! build_system = "autotools"
//! jobs = 4
//! ```

use crate::error::{Error, Result};
use crate::hash::{Digest, HashAlgorithm};
use crate::recipe::format::{
    FileSpec, GpgSpec, RECIPE_SCHEMA, Recipe, RecipeOptions, default_host,
};
use crate::environment::Environment;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeDocument {
    #[serde(default = "default_schema")]
    schema: u32,
    package: PackageDocument,
    #[serde(default)]
    files: Vec<FileDocument>,
    #[serde(default)]
    patch_files: Vec<PathBuf>,
    #[serde(default)]
    configure_options: BTreeMap<String, String>,
    #[serde(default)]
    options: RecipeOptions,
}

fn default_schema() -> u32 {
    RECIPE_SCHEMA
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageDocument {
    name: String,
    version: String,
    host: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileDocument {
    url: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
    sha256: Option<String>,
    sha1: Option<String>,
    md5: Option<String>,
    /// Prefixed form, e.g. "sha256:..."
    digest: Option<String>,
    gpg: Option<GpgDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GpgDocument {
    key: String,
    signature: Option<String>,
    signature_url: Option<String>,
}

impl FileDocument {
    fn into_spec(self) -> Result<FileSpec> {
        let urls: Vec<String> = self.url.into_iter().chain(self.urls).collect();
        if urls.is_empty() {
            return Err(Error::Parse("file entry needs `url` or `urls`".to_string()));
        }

        let digests: Vec<Digest> = [
            self.sha256.map(|v| Digest::new(HashAlgorithm::Sha256, v)),
            self.sha1.map(|v| Digest::new(HashAlgorithm::Sha1, v)),
            self.md5.map(|v| Digest::new(HashAlgorithm::Md5, v)),
        ]
        .into_iter()
        .flatten()
        .chain(
            self.digest
                .map(|d| Digest::parse_prefixed(&d).map_err(|e| Error::Parse(e.to_string())))
                .transpose()?,
        )
        .collect();

        if digests.len() > 1 {
            return Err(Error::Parse(format!(
                "file entry for {} has more than one digest",
                urls[0]
            )));
        }

        let gpg = match self.gpg {
            None => None,
            Some(GpgDocument {
                key,
                signature: Some(signature),
                signature_url: None,
            }) => Some(GpgSpec::new(key, signature)),
            Some(GpgDocument {
                key,
                signature: None,
                signature_url: Some(url),
            }) => Some(GpgSpec::with_signature_url(key, url)),
            Some(_) => {
                return Err(Error::Parse(
                    "gpg needs exactly one of `signature` or `signature_url`".to_string(),
                ));
            }
        };

        Ok(FileSpec {
            urls,
            digest: digests.into_iter().next(),
            gpg,
        })
    }
}

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    parse_document(content, None)
}

/// Parse a recipe from a file
///
/// Relative patch paths are resolved against the recipe's directory.
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)?;
    parse_document(&content, path.parent())
}

fn parse_document(content: &str, base: Option<&Path>) -> Result<Recipe> {
    let doc: RecipeDocument =
        toml::from_str(content).map_err(|e| Error::Parse(format!("invalid recipe: {e}")))?;

    if doc.schema != RECIPE_SCHEMA {
        return Err(Error::Parse(format!(
            "unsupported recipe schema {} (expected {})",
            doc.schema, RECIPE_SCHEMA
        )));
    }

    let host = doc
        .package
        .host
        .unwrap_or_else(|| default_host(&Environment::from_process()));

    let files = doc
        .files
        .into_iter()
        .map(FileDocument::into_spec)
        .collect::<Result<Vec<_>>>()?;

    let patch_files = doc
        .patch_files
        .into_iter()
        .map(|p| match base {
            Some(base) if p.is_relative() => base.join(p),
            _ => p,
        })
        .collect();

    let recipe = Recipe {
        name: doc.package.name,
        version: doc.package.version,
        host,
        files,
        patch_files,
        configure_options: doc.configure_options,
        options: doc.options,
    };

    validate_recipe(&recipe)?;
    Ok(recipe)
}

/// Validate a recipe for completeness and correctness
pub fn validate_recipe(recipe: &Recipe) -> Result<()> {
    recipe.validate()
}
