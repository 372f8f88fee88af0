// src/fetch/verify.rs

//! Integrity checks for downloaded files
//!
//! Every check configured on a [`FileSpec`] must pass before the file is
//! accepted; the first failure is returned as-is.

use crate::error::{Error, Result};
use crate::hash::{Digest, VerifyError, verify_file};
use crate::recipe::{FileSpec, GpgSpec, KeySource, SignatureSource};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::Downloader;
use super::gpg;

/// Compare a file's digest against the expected value
pub fn verify_digest(path: &Path, expected: &Digest) -> Result<()> {
    verify_file(path, expected).map_err(|e| match e {
        VerifyError::Mismatch {
            expected,
            actual,
            algorithm,
        } => Error::ChecksumMismatch {
            algorithm: algorithm.to_string(),
            expected,
            actual,
        },
        VerifyError::Io(e) => Error::Io(e),
    })?;
    debug!("{} matches {}", path.display(), expected);
    Ok(())
}

/// Check a detached signature, fetching the key or signature if needed
pub fn verify_signature(path: &Path, spec: &GpgSpec, downloader: &Downloader) -> Result<()> {
    let cert = match &spec.key {
        KeySource::Armored(block) => gpg::parse_key(block.as_bytes())?,
        KeySource::KeyId(id) => downloader.fetch_key(id)?,
    };

    let signature = match &spec.signature {
        SignatureSource::Inline(text) => text.as_bytes().to_vec(),
        SignatureSource::Url(url) => downloader
            .fetch_bytes(url)
            .map_err(|e| Error::SignatureMismatch(format!("could not fetch signature: {e}")))?,
    };

    let data = fs::read(path)?;
    gpg::verify_detached(&cert, &data, &signature)
}

/// Run every check configured on `spec` against the file at `path`
pub fn verify_artifact(path: &Path, spec: &FileSpec, downloader: &Downloader) -> Result<()> {
    if let Some(digest) = &spec.digest {
        verify_digest(path, digest)?;
    }
    if let Some(gpg) = &spec.gpg {
        verify_signature(path, gpg, downloader)?;
    }
    Ok(())
}
