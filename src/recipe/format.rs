// src/recipe/format.rs

//! Recipe definitions
//!
//! A recipe names one versioned source package, where to download it, how to
//! verify it, which patches to apply and how to configure it. Everything the
//! kitchen derives (paths, commands, fingerprints) comes from these values.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::hash::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Current version of the recipe document format
pub const RECIPE_SCHEMA: u32 = 1;

/// A source package build description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    /// Package name (e.g. "libxml2")
    pub name: String,

    /// Package version (e.g. "2.11.5")
    pub version: String,

    /// Target host triple passed to configure
    pub host: String,

    /// Files to download, in order; the first one is the main archive
    pub files: Vec<FileSpec>,

    /// Patches applied to the extracted tree, in order
    pub patch_files: Vec<PathBuf>,

    /// Configure options; an empty value renders as a bare flag
    pub configure_options: BTreeMap<String, String>,

    /// Everything else that shapes the build
    pub options: RecipeOptions,
}

impl Recipe {
    /// Create a recipe for the default host
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::for_host(name, version, default_host(&Environment::from_process()))
    }

    /// Create a recipe for an explicit host triple
    pub fn for_host(
        name: impl Into<String>,
        version: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            host: host.into(),
            files: Vec::new(),
            patch_files: Vec::new(),
            configure_options: BTreeMap::new(),
            options: RecipeOptions::default(),
        }
    }

    pub fn with_file(mut self, file: FileSpec) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_patch(mut self, patch: impl Into<PathBuf>) -> Self {
        self.patch_files.push(patch.into());
        self
    }

    /// Add a configure option (`--name=value`, or `--name` when value is empty)
    pub fn with_configure_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.configure_options.insert(name.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: RecipeOptions) -> Self {
        self.options = options;
        self
    }

    /// "name-version", the conventional top-level directory of the archive
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Library name used for `-l` flags: the recipe name without a leading "lib"
    pub fn lib_name(&self) -> &str {
        self.name.strip_prefix("lib").unwrap_or(&self.name)
    }

    /// Check the recipe can be cooked
    ///
    /// Name, version and host become path components, so they must be
    /// non-empty and must not escape their parent directory.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("host", &self.host),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidArgument(format!("recipe {field} cannot be empty")));
            }
            if value.contains(['/', '\\']) || value == "." || value == ".." {
                return Err(Error::InvalidArgument(format!(
                    "recipe {field} '{value}' cannot be used as a path component"
                )));
            }
        }

        if self.files.is_empty() && self.options.source_directory.is_none() {
            return Err(Error::Config(format!(
                "recipe {} has neither files nor a source directory",
                self.full_name()
            )));
        }

        if self.options.source_directory.is_some() && !self.patch_files.is_empty() {
            return Err(Error::Config(
                "patches cannot be applied to a local source directory".to_string(),
            ));
        }

        for file in &self.files {
            file.validate()?;
        }

        Ok(())
    }
}

/// Build system driving configure/compile/install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    /// `./configure && make && make install`
    #[default]
    Autotools,
    /// `cmake . && make && make install`
    Cmake,
}

/// Recognized recipe options
///
/// Every option that changes the build is listed here; documents carrying
/// anything else are rejected when parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecipeOptions {
    /// Which build system the package uses
    pub build_system: BuildSystem,

    /// Make tool (overridden by `MAKE`)
    pub make_command: Option<String>,

    /// CMake tool (overridden by `CMAKE`)
    pub cmake_command: Option<String>,

    /// C compiler (overridden by `CC`)
    pub gcc_command: Option<String>,

    /// C++ compiler (overridden by `CXX`)
    pub cxx_command: Option<String>,

    /// Expand backslash escapes in command arguments
    pub unescape_commands: bool,

    /// Build from a local tree instead of downloading
    pub source_directory: Option<PathBuf>,

    /// Parallel compile jobs (`-jN`)
    pub jobs: Option<u32>,

    /// Raw arguments appended to the configure command
    pub configure_args: Vec<String>,
}

impl Default for RecipeOptions {
    fn default() -> Self {
        Self {
            build_system: BuildSystem::Autotools,
            make_command: None,
            cmake_command: None,
            gcc_command: None,
            cxx_command: None,
            unescape_commands: true,
            source_directory: None,
            jobs: None,
            configure_args: Vec::new(),
        }
    }
}

/// A download source plus optional integrity checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSpec {
    /// Candidate URLs in priority order (mirrors)
    pub urls: Vec<String>,

    /// Expected digest of the file
    pub digest: Option<Digest>,

    /// Detached signature check
    pub gpg: Option<GpgSpec>,
}

impl FileSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            digest: None,
            gpg: None,
        }
    }

    /// Add a fallback URL tried after the existing ones
    pub fn with_mirror(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn with_gpg(mut self, gpg: GpgSpec) -> Self {
        self.gpg = Some(gpg);
        self
    }

    /// Whether any integrity check is configured
    pub fn is_verified(&self) -> bool {
        self.digest.is_some() || self.gpg.is_some()
    }

    /// File name used in the archive cache
    ///
    /// Taken from the last path segment of the primary URL, percent-decoded.
    pub fn file_name(&self) -> String {
        let primary = self.urls.first().map(String::as_str).unwrap_or_default();
        let path = primary
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let segment = path.rsplit(['/', '\\']).next().unwrap_or_default();
        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());

        if decoded.is_empty() || decoded.contains(':') {
            "download".to_string()
        } else {
            decoded
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() || self.urls.iter().any(|u| u.trim().is_empty()) {
            return Err(Error::Config("file spec needs at least one non-empty URL".to_string()));
        }
        if let Some(digest) = &self.digest {
            digest
                .validate()
                .map_err(|e| Error::Config(format!("bad digest for {}: {e}", self.file_name())))?;
        }
        Ok(())
    }
}

/// Detached OpenPGP signature check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpgSpec {
    pub key: KeySource,
    pub signature: SignatureSource,
}

impl GpgSpec {
    /// Key material (armored block or key id) plus an inline armored signature
    pub fn new(key: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            key: KeySource::from_material(key),
            signature: SignatureSource::Inline(signature.into()),
        }
    }

    /// Key material plus a URL the signature is downloaded from
    pub fn with_signature_url(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: KeySource::from_material(key),
            signature: SignatureSource::Url(url.into()),
        }
    }
}

/// Where the public key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeySource {
    /// An ASCII-armored (or binary) public key block
    Armored(String),
    /// A key id or fingerprint looked up on the keyserver
    KeyId(String),
}

impl KeySource {
    /// Classify key material: anything that is not an armored block is a key id
    pub fn from_material(material: impl Into<String>) -> Self {
        let material = material.into();
        if material.contains("-----BEGIN PGP") {
            Self::Armored(material)
        } else {
            Self::KeyId(material.trim().to_string())
        }
    }
}

/// Where the detached signature comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SignatureSource {
    Inline(String),
    Url(String),
}

/// Default host triple: `TARGET` when set (as in build scripts), else the
/// triple this crate was compiled for
pub fn default_host(env: &Environment) -> String {
    if let Some(target) = env.get("TARGET") {
        return target.to_string();
    }

    let arch = std::env::consts::ARCH;
    if cfg!(target_os = "linux") {
        if cfg!(target_env = "musl") {
            format!("{arch}-linux-musl")
        } else {
            format!("{arch}-linux-gnu")
        }
    } else if cfg!(target_os = "macos") {
        format!("{arch}-apple-darwin")
    } else if cfg!(all(windows, target_env = "msvc")) {
        format!("{arch}-pc-windows-msvc")
    } else if cfg!(windows) {
        format!("{arch}-w64-mingw32")
    } else {
        format!("{arch}-{}", std::env::consts::OS)
    }
}

/// Triple of the machine running the build: `HOST` when set, else the
/// compiled-in default
pub fn build_triple(env: &Environment) -> String {
    match env.get("HOST") {
        Some(host) => host.to_string(),
        None => default_host(&Environment::empty()),
    }
}

/// Whether two triples name the same machine
///
/// Vendor fields are ignored, so `x86_64-unknown-linux-gnu` and
/// `x86_64-linux-gnu` compare equal.
pub fn same_triple(a: &str, b: &str) -> bool {
    triple_parts(a) == triple_parts(b)
}

fn triple_parts(triple: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    for (i, part) in triple.split('-').enumerate() {
        match part {
            "amd64" if i == 0 => parts.push("x86_64"),
            "arm64" if i == 0 => parts.push("aarch64"),
            "unknown" | "pc" | "w64" | "apple" | "none" if i > 0 => {}
            "mingw32" => parts.extend(["windows", "gnu"]),
            part => parts.push(part),
        }
    }
    parts
}
