// src/error.rs

//! Crate-wide error type
//!
//! Errors fall into four families:
//! - transport (`Download`): retried across mirrors, fatal once all fail
//! - integrity (`ChecksumMismatch`, `SignatureMismatch`, `InvalidGpgKey`,
//!   `KeyDownloadFailed`): always fatal, the artifact is discarded
//! - tool invocation (`CommandFailed`, `ToolNotFound`): the step stays unstamped
//! - configuration (`InvalidArgument`, `Config`): raised before anything runs
//!
//! Anything raised inside a pipeline step is wrapped in [`Error::Step`] so the
//! caller can tell which step failed.

use crate::recipe::Step;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout portcook
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Every candidate URL failed
    #[error("download failed: {0}")]
    Download(String),

    /// Digest of the downloaded bytes differs from the expected value
    #[error("checksum mismatch: expected {algorithm}:{expected}, got {actual}")]
    ChecksumMismatch {
        algorithm: String,
        expected: String,
        actual: String,
    },

    /// Detached signature did not verify against the key
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// Embedded key material could not be parsed
    #[error("invalid gpg key provided: {0}")]
    InvalidGpgKey(String),

    /// Key id could not be fetched from the keyserver
    #[error("key download failed: {0}")]
    KeyDownloadFailed(String),

    /// External command exited unsuccessfully
    #[error("{step} failed: `{program}` exited with {}; see {}", exit_code_text(.exit_code), .log.display())]
    CommandFailed {
        step: String,
        program: String,
        exit_code: Option<i32>,
        log: PathBuf,
    },

    /// Executable not found on PATH
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Caller asked for something that does not exist or is malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Recipe or kitchen configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input (recipe TOML, pkg-config descriptor, stamp file)
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline step failed
    #[error("step `{step}` failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<Error>,
    },
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl Error {
    /// Attach the failing pipeline step, unless one is already attached
    pub fn in_step(self, step: Step) -> Self {
        match self {
            Error::Step { .. } => self,
            other => Error::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The error with any step wrapper removed
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// The pipeline step this error was raised in, if any
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// True for checksum and signature failures
    pub fn is_integrity(&self) -> bool {
        matches!(
            self.root(),
            Error::ChecksumMismatch { .. }
                | Error::SignatureMismatch(_)
                | Error::InvalidGpgKey(_)
                | Error::KeyDownloadFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_step_wraps_once() {
        let err = Error::Download("nope".to_string())
            .in_step(Step::Download)
            .in_step(Step::Install);
        assert_eq!(err.step(), Some(Step::Download));
        assert!(matches!(err.root(), Error::Download(_)));
    }

    #[test]
    fn test_integrity_messages() {
        let err = Error::ChecksumMismatch {
            algorithm: "sha256".to_string(),
            expected: "00".to_string(),
            actual: "ff".to_string(),
        };
        assert!(err.to_string().starts_with("checksum mismatch"));
        assert!(err.is_integrity());

        let err = Error::SignatureMismatch("bad".to_string()).in_step(Step::Download);
        assert!(err.is_integrity());
        assert!(err.to_string().contains("signature mismatch"));
    }

    #[test]
    fn test_command_failed_names_log() {
        let err = Error::CommandFailed {
            step: "compile".to_string(),
            program: "make".to_string(),
            exit_code: Some(2),
            log: PathBuf::from("/tmp/compile.log"),
        };
        let text = err.to_string();
        assert!(text.contains("status 2"));
        assert!(text.contains("/tmp/compile.log"));
    }
}
