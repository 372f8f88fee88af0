// src/flags/pkgconfig.rs

//! pkg-config descriptor parsing
//!
//! Descriptors are read in-process: variables, `${var}` expansion, the
//! implicit `pcfiledir` variable and the `Cflags`, `Libs`, `Libs.private`,
//! `Requires` and `Requires.private` fields. Version constraints on
//! requirements are accepted and ignored.

use crate::error::{Error, Result};
use shell_words::split as shell_split;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Guard against self-referencing variables
const MAX_EXPANSION_DEPTH: usize = 32;

/// One parsed `.pc` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgConfigFile {
    pub name: String,
    pub path: PathBuf,
    variables: BTreeMap<String, String>,
    fields: BTreeMap<String, String>,
}

impl PkgConfigFile {
    pub fn parse(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content, path)
    }

    pub fn parse_str(content: &str, path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut variables = BTreeMap::new();
        let mut fields = BTreeMap::new();

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        variables.insert("pcfiledir".to_string(), dir.to_string_lossy().into_owned());

        for line in logical_lines(content) {
            let line = strip_comment(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let eq = line.find('=');
            let colon = line.find(':');
            match (eq, colon) {
                (Some(e), c) if c.is_none_or(|c| e < c) => {
                    let key = line[..e].trim();
                    if !is_identifier(key) {
                        return Err(Error::Parse(format!(
                            "{}: bad variable name '{key}'",
                            path.display()
                        )));
                    }
                    variables.insert(key.to_string(), line[e + 1..].trim().to_string());
                }
                (_, Some(c)) => {
                    fields.insert(line[..c].trim().to_string(), line[c + 1..].trim().to_string());
                }
                _ => {
                    return Err(Error::Parse(format!(
                        "{}: cannot parse line '{line}'",
                        path.display()
                    )));
                }
            }
        }

        Ok(Self {
            name,
            path: path.to_path_buf(),
            variables,
            fields,
        })
    }

    /// Value of a variable with references expanded
    pub fn variable(&self, name: &str) -> Result<Option<String>> {
        self.variables
            .get(name)
            .map(|v| self.expand(v, 0))
            .transpose()
    }

    /// Value of a field (`Cflags`, `Libs`, ...) with references expanded
    pub fn field(&self, name: &str) -> Result<Option<String>> {
        self.fields.get(name).map(|v| self.expand(v, 0)).transpose()
    }

    fn expand(&self, value: &str, depth: usize) -> Result<String> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(Error::Parse(format!(
                "{}: variable expansion is too deep",
                self.path.display()
            )));
        }

        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                Error::Parse(format!("{}: unterminated '${{' in '{value}'", self.path.display()))
            })?;
            let name = &after[..end];
            let raw = self.variables.get(name).ok_or_else(|| {
                Error::Parse(format!("{}: undefined variable '{name}'", self.path.display()))
            })?;
            out.push_str(&self.expand(raw, depth + 1)?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        // "$$" is a literal dollar
        Ok(out.replace("$$", "$"))
    }

    fn split_field(&self, name: &str) -> Result<Vec<String>> {
        match self.field(name)? {
            Some(value) => shell_split(&value).map_err(|e| {
                Error::Parse(format!("{}: bad {name} field: {e}", self.path.display()))
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn cflags(&self) -> Result<Vec<String>> {
        self.split_field("Cflags")
    }

    /// `Libs`, plus `Libs.private` for static linking
    pub fn libs(&self, static_link: bool) -> Result<Vec<String>> {
        let mut libs = self.split_field("Libs")?;
        if static_link {
            libs.extend(self.split_field("Libs.private")?);
        }
        Ok(libs)
    }

    /// Names of required packages, plus private ones for static linking
    pub fn requires(&self, static_link: bool) -> Result<Vec<String>> {
        let mut names = parse_requires(&self.field("Requires")?.unwrap_or_default());
        if static_link {
            names.extend(parse_requires(
                &self.field("Requires.private")?.unwrap_or_default(),
            ));
        }
        Ok(names)
    }
}

/// Join backslash-continued lines
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped);
            current.push(' ');
        } else {
            current.push_str(line);
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Package names from a `Requires` value, version constraints dropped
pub fn parse_requires(value: &str) -> Vec<String> {
    const OPERATORS: [&str; 6] = ["<", "<=", "=", "!=", ">=", ">"];

    let mut names = Vec::new();
    let mut tokens = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty());

    while let Some(token) = tokens.next() {
        if OPERATORS.contains(&token) {
            tokens.next();
        } else {
            names.push(token.to_string());
        }
    }
    names
}

/// First `<dir>/<name>.pc` on the search path
pub fn find_package(name: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    search_path
        .iter()
        .map(|dir| dir.join(format!("{name}.pc")))
        .find(|p| p.is_file())
}

/// Flags of a package and everything it requires
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFlags {
    pub cflags: Vec<String>,
    pub libs: Vec<String>,
}

/// Resolve a package's flags, its own first, then those of its requirements
pub fn resolve(name: &str, search_path: &[PathBuf], static_link: bool) -> Result<PackageFlags> {
    let mut flags = PackageFlags::default();
    let mut seen = HashSet::new();
    resolve_into(name, search_path, static_link, &mut seen, &mut flags)?;
    Ok(flags)
}

fn resolve_into(
    name: &str,
    search_path: &[PathBuf],
    static_link: bool,
    seen: &mut HashSet<String>,
    flags: &mut PackageFlags,
) -> Result<()> {
    if !seen.insert(name.to_string()) {
        return Ok(());
    }

    let path = find_package(name, search_path).ok_or_else(|| {
        Error::InvalidArgument(format!("pkg-config package '{name}' not found on search path"))
    })?;
    debug!("Resolving pkg-config package {} from {}", name, path.display());

    let pc = PkgConfigFile::parse(&path)?;
    flags.cflags.extend(pc.cflags()?);
    flags.libs.extend(pc.libs(static_link)?);

    for required in pc.requires(static_link)? {
        resolve_into(&required, search_path, static_link, seen, flags)?;
    }
    Ok(())
}
