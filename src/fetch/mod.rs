// src/fetch/mod.rs

//! Source downloads and their integrity checks
//!
//! Supported sources:
//! - `http://` and `https://`, optionally through `http_proxy`/`https_proxy`
//! - `ftp://`, passive mode or through `ftp_proxy`
//! - `file://` URLs and plain local paths
//!
//! Files can be checked against an md5/sha1/sha256 digest and against a
//! detached OpenPGP signature.

mod client;
mod download;
pub mod ftp;
pub mod gpg;
mod verify;

pub use client::{ProxySettings, build_http_client};
pub use download::Downloader;
pub use verify::{verify_artifact, verify_digest, verify_signature};

use std::time::Duration;

/// Network settings for downloads and key lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed for a whole HTTP request, or between reads on FTP
    pub read_timeout: Duration,
    /// Maximum number of HTTP redirects followed
    pub max_redirects: usize,
    /// HKP keyserver for key id lookups
    pub keyserver: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
            max_redirects: 5,
            keyserver: gpg::DEFAULT_KEYSERVER.to_string(),
        }
    }
}
