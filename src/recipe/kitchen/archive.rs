// src/recipe/kitchen/archive.rs

//! Archive and patch utilities for the Kitchen
//!
//! Tarballs compressed with gzip, xz or zstd are unpacked in-process. Other
//! formats (bzip2, zip, ...) are handed to the system `tar` or `unzip`.

use crate::error::{Error, Result};
use crate::recipe::Step;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use xz2::read::XzDecoder;

use super::runner::{Invocation, find_program};

/// How an archive gets unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    TarXz,
    TarZst,
    Zip,
    /// Anything else the system `tar` may understand
    Other,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Self::TarXz
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Self::TarZst
        } else if name.ends_with(".tar") {
            Self::Tar
        } else if name.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Other
        }
    }

    /// Whether the archive is unpacked without an external tool
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Tar | Self::TarGz | Self::TarXz | Self::TarZst)
    }
}

/// Unpack a tarball into `dest`
pub fn extract_tarball(archive: &Path, dest: &Path) -> Result<()> {
    let kind = ArchiveKind::detect(archive);
    if !kind.is_native() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a tarball",
            archive.display()
        )));
    }
    let file = BufReader::new(File::open(archive)?);

    let reader: Box<dyn Read> = match kind {
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
        ArchiveKind::TarXz => Box::new(XzDecoder::new(file)),
        ArchiveKind::TarZst => Box::new(zstd::stream::read::Decoder::with_buffer(file)?),
        ArchiveKind::Zip | ArchiveKind::Other => unreachable!("checked above"),
    };

    fs::create_dir_all(dest)?;
    debug!("Unpacking {} into {}", archive.display(), dest.display());

    tar::Archive::new(reader)
        .unpack(dest)
        .map_err(|e| Error::Parse(format!("failed to extract {}: {e}", archive.display())))
}

/// External command that unpacks a non-tarball archive
pub fn external_extract(archive: &Path, dest: &Path, log: &Path) -> Invocation {
    let invocation = match ArchiveKind::detect(archive) {
        ArchiveKind::Zip => Invocation::new(Step::Extract, "unzip", dest)
            .arg("-q")
            .arg("-o")
            .arg(archive.to_string_lossy()),
        _ => Invocation::new(Step::Extract, "tar", dest)
            .arg("-xf")
            .arg(archive.to_string_lossy())
            .arg("-C")
            .arg(dest.to_string_lossy()),
    };
    invocation.log_to(log)
}

/// Command that applies one patch inside `work_path`
///
/// `git apply` works on trees that are not repositories when given a
/// throwaway `--git-dir`; plain `patch -p1` is the fallback.
pub fn patch_command(
    patch: &Path,
    work_path: &Path,
    scratch_git_dir: &Path,
    log: &Path,
) -> Result<Invocation> {
    let patch_arg = patch.to_string_lossy().into_owned();

    let invocation = if find_program("git").is_some() {
        Invocation::new(Step::Patch, "git", work_path).args([
            format!("--git-dir={}", scratch_git_dir.display()),
            "--work-tree=.".to_string(),
            "apply".to_string(),
            "--whitespace=warn".to_string(),
            patch_arg,
        ])
    } else if find_program("patch").is_some() {
        Invocation::new(Step::Patch, "patch", work_path).args(["-p1".to_string(), "-i".to_string(), patch_arg])
    } else {
        return Err(Error::ToolNotFound("git or patch".to_string()));
    };

    Ok(invocation.log_to(log))
}

/// Top-level directories of `dir`, sorted
pub fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
