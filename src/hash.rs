// src/hash.rs

//! Digests for archive verification and step fingerprints
//!
//! Upstream download pages still publish a mix of digests, so every
//! algorithm they commonly use is supported:
//!
//! | Algorithm | Where it shows up |
//! |-----------|-------------------|
//! | SHA-256 | Modern release pages, step fingerprints |
//! | SHA-1 | Older GNU and sourceforge mirrors |
//! | MD5 | Legacy projects that never moved on |

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Hash parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown hash algorithm name
    UnknownAlgorithm(String),
    /// Hash string has wrong length for algorithm
    InvalidLength { expected: usize, got: usize },
    /// Hash string contains invalid hex characters
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// An expected digest: algorithm plus hex value
///
/// The value is kept exactly as the caller supplied it; comparison against
/// computed digests is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Digest {
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Self {
        Self {
            algorithm,
            value: value.into(),
        }
    }

    pub fn sha256(value: impl Into<String>) -> Self {
        Self::new(HashAlgorithm::Sha256, value)
    }

    /// Parse a prefixed digest string (e.g. "sha256:abc123...")
    ///
    /// Unprefixed values are taken as SHA-256.
    pub fn parse_prefixed(s: &str) -> Result<Self, HashError> {
        let (algorithm, value) = match s.split_once(':') {
            Some((algo, value)) => (algo.parse()?, value),
            None => (HashAlgorithm::Sha256, s),
        };
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value.to_string()));
        }
        Ok(Self::new(algorithm, value))
    }

    /// Format as a prefixed string (e.g. "sha256:abc123...")
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.value)
    }

    /// Check the value has the right length for its algorithm
    pub fn validate(&self) -> Result<(), HashError> {
        let expected = self.algorithm.hex_len();
        if self.value.len() != expected {
            return Err(HashError::InvalidLength {
                expected,
                got: self.value.len(),
            });
        }
        if !self.value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(self.value.clone()));
        }
        Ok(())
    }

    /// Case-insensitive comparison against a computed hex digest
    pub fn matches(&self, actual_hex: &str) -> bool {
        self.value.eq_ignore_ascii_case(actual_hex)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefixed_string())
    }
}

/// Hasher that can compute hashes using any supported algorithm
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    /// Create a new hasher with the specified algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
        };
        Self { state }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Md5(hasher) => hasher.update(data),
            HasherState::Sha1(hasher) => hasher.update(data),
            HasherState::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the lowercase hex digest
    pub fn finalize_hex(self) -> String {
        match self.state {
            HasherState::Md5(hasher) => hex::encode(hasher.finalize()),
            HasherState::Sha1(hasher) => hex::encode(hasher.finalize()),
            HasherState::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Compute the hex digest of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Compute the hex digest of data from a reader
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize_hex())
}

/// Compute the hex digest of a file, streaming its content
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(algorithm, &mut file)
}

/// SHA-256 hex digest (convenience function)
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data)
}

/// Why a file failed verification
#[derive(Debug)]
pub enum VerifyError {
    /// The content hashed to something else
    Mismatch {
        expected: String,
        actual: String,
        algorithm: HashAlgorithm,
    },
    /// The file could not be read
    Io(io::Error),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch {
                expected,
                actual,
                algorithm,
            } => write!(f, "{algorithm} mismatch: expected {expected}, got {actual}"),
            Self::Io(e) => write!(f, "failed to read file: {e}"),
        }
    }
}

impl std::error::Error for VerifyError {}

impl From<io::Error> for VerifyError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Verify a file matches an expected digest
///
/// Streams the file content to avoid loading it entirely into memory.
pub fn verify_file(path: &Path, expected: &Digest) -> Result<(), VerifyError> {
    let actual = hash_file(expected.algorithm, path)?;

    if expected.matches(&actual) {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            expected: expected.value.clone(),
            actual,
            algorithm: expected.algorithm,
        })
    }
}
