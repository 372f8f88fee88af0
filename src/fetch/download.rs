// src/fetch/download.rs

//! Mirrored, verified downloads into the archive cache
//!
//! # Flow
//!
//! 1. A cached file that still passes its checks is reused; one that fails
//!    is deleted. Unverified files are reused only when a `.<name>.source`
//!    marker shows they came from the same primary URL.
//! 2. Each candidate URL is tried in order. Transport failures move on to the
//!    next mirror.
//! 3. The bytes land in a temp file inside the cache directory, are
//!    verified, and only then renamed into place. Integrity failures stop
//!    the download immediately.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::recipe::FileSpec;
use reqwest::blocking::Client;
use sequoia_openpgp::Cert;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use super::client::{ProxySettings, build_http_client};
use super::verify::verify_artifact;
use super::{FetchConfig, ftp, gpg};

/// Where a URL points
enum Source {
    Http(Url),
    Ftp(Url),
    Local(PathBuf),
}

fn classify(target: &str) -> Result<Source> {
    match Url::parse(target) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Source::Http(url)),
            "ftp" => Ok(Source::Ftp(url)),
            "file" => url
                .to_file_path()
                .map(Source::Local)
                .map_err(|_| Error::Download(format!("{target}: not a local file URL"))),
            // Drive letters parse as one-letter schemes
            scheme if scheme.len() == 1 => Ok(Source::Local(PathBuf::from(target))),
            scheme => Err(Error::Download(format!("{target}: unsupported scheme '{scheme}'"))),
        },
        Err(_) => Ok(Source::Local(PathBuf::from(target))),
    }
}

/// Marker next to a cached file naming the primary URL it was fetched for
fn source_marker(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{name}.source"))
}

fn cached_from(marker: &Path, url: &str) -> bool {
    fs::read_to_string(marker).is_ok_and(|recorded| recorded == url)
}

fn discard_cached(dest: &Path, marker: &Path) -> Result<()> {
    fs::remove_file(dest)?;
    match fs::remove_file(marker) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Downloads files over HTTP(S), FTP or from local paths
pub struct Downloader {
    client: Client,
    proxies: ProxySettings,
    config: FetchConfig,
}

impl Downloader {
    /// Create a downloader using the proxies found in `env`
    pub fn new(config: FetchConfig, env: &Environment) -> Result<Self> {
        Self::with_proxies(config, ProxySettings::from_env(env))
    }

    pub fn with_proxies(config: FetchConfig, proxies: ProxySettings) -> Result<Self> {
        let client = build_http_client(&config, &proxies)?;
        Ok(Self {
            client,
            proxies,
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Stream one URL into `dest`, returning the byte count
    pub fn fetch_to(&self, target: &str, dest: &mut dyn Write) -> Result<u64> {
        match classify(target)? {
            Source::Http(url) => {
                let mut response = self
                    .client
                    .get(url.clone())
                    .send()
                    .map_err(|e| Error::Download(format!("{url}: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Download(format!("{url}: HTTP {status}")));
                }

                response
                    .copy_to(dest)
                    .map_err(|e| Error::Download(format!("{url}: {e}")))
            }
            Source::Ftp(url) => match &self.proxies.ftp {
                Some(proxy) => ftp::fetch_via_proxy(proxy, &url, dest, &self.config),
                None => ftp::fetch_passive(&url, dest, &self.config),
            },
            Source::Local(path) => {
                let mut file = File::open(&path)
                    .map_err(|e| Error::Download(format!("{}: {e}", path.display())))?;
                io::copy(&mut file, dest)
                    .map_err(|e| Error::Download(format!("{}: {e}", path.display())))
            }
        }
    }

    /// Fetch a small resource (signature, key) into memory
    pub fn fetch_bytes(&self, target: &str) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.fetch_to(target, &mut buffer)?;
        Ok(buffer)
    }

    /// Fetch a public key by id from the configured keyserver
    pub fn fetch_key(&self, key_id: &str) -> Result<Cert> {
        let id = gpg::normalize_key_id(key_id)?;
        let url = gpg::lookup_url(&self.config.keyserver, &id);
        debug!("Fetching key {} from {}", id, url);

        let body = self
            .fetch_bytes(&url)
            .map_err(|e| Error::KeyDownloadFailed(format!("{id}: {e}")))?;
        gpg::parse_fetched_key(&id, &body)
    }

    /// Download and verify `spec` into `dir`, returning the cached path
    pub fn download(&self, spec: &FileSpec, dir: &Path) -> Result<PathBuf> {
        spec.validate()?;
        fs::create_dir_all(dir)?;
        let name = spec.file_name();
        let dest = dir.join(&name);
        let marker = source_marker(dir, &name);
        let primary = spec.urls.first().map(String::as_str).unwrap_or_default();

        if dest.exists() {
            if !spec.is_verified() && !cached_from(&marker, primary) {
                info!("Cached {} was fetched from another URL, re-downloading", dest.display());
                discard_cached(&dest, &marker)?;
            } else {
                match verify_artifact(&dest, spec, self) {
                    Ok(()) => {
                        debug!("Using cached {}", dest.display());
                        return Ok(dest);
                    }
                    Err(e) if e.is_integrity() => {
                        warn!("Cached {} failed verification ({}), re-downloading", dest.display(), e);
                        discard_cached(&dest, &marker)?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let mut last_error = None;
        for url in &spec.urls {
            info!("Downloading {}", url);

            let mut staged = tempfile::Builder::new()
                .prefix(".download-")
                .tempfile_in(dir)?;

            let bytes = match self.fetch_to(url, staged.as_file_mut()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to download {}: {}", url, e);
                    last_error = Some(e);
                    continue;
                }
            };
            staged.as_file_mut().flush()?;

            // Integrity failures are final; the staged file is dropped (deleted)
            verify_artifact(staged.path(), spec, self)?;

            staged.persist(&dest).map_err(|e| Error::Io(e.error))?;
            fs::write(&marker, primary)?;
            info!("Downloaded {} ({} bytes)", dest.display(), bytes);
            return Ok(dest);
        }

        Err(Error::Download(match last_error {
            Some(e) => format!("all URLs failed for {name}; last error: {e}"),
            None => format!("no URLs for {name}"),
        }))
    }
}
