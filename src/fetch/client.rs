// src/fetch/client.rs

//! HTTP client construction
//!
//! Proxies come from the environment snapshot rather than reqwest's own
//! system-proxy lookup, so the caller decides exactly which values apply.

use crate::environment::Environment;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::Proxy;
use tracing::debug;

use super::FetchConfig;

/// Proxy URLs per scheme
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub ftp: Option<String>,
}

impl ProxySettings {
    /// No proxies at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Read `http_proxy`, `https_proxy` and `ftp_proxy`
    ///
    /// Lowercase names win over uppercase ones. Values without a scheme are
    /// taken as `http://`.
    pub fn from_env(env: &Environment) -> Self {
        let read = |lower: &str, upper: &str| env.get_any(&[lower, upper]).map(normalize_proxy);
        Self {
            http: read("http_proxy", "HTTP_PROXY"),
            https: read("https_proxy", "HTTPS_PROXY"),
            ftp: read("ftp_proxy", "FTP_PROXY"),
        }
    }
}

fn normalize_proxy(value: &str) -> String {
    let value = value.trim();
    if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{value}")
    }
}

/// Build the blocking HTTP client used for downloads and key lookups
pub fn build_http_client(config: &FetchConfig, proxies: &ProxySettings) -> Result<Client> {
    let mut builder = Client::builder()
        .no_proxy()
        .connect_timeout(config.connect_timeout)
        .timeout(config.read_timeout)
        .redirect(Policy::limited(config.max_redirects))
        .user_agent(concat!("portcook/", env!("CARGO_PKG_VERSION")));

    if let Some(proxy) = &proxies.http {
        debug!("Using HTTP proxy {}", proxy);
        builder = builder.proxy(
            Proxy::http(proxy).map_err(|e| Error::Config(format!("invalid http_proxy '{proxy}': {e}")))?,
        );
    }
    if let Some(proxy) = &proxies.https {
        debug!("Using HTTPS proxy {}", proxy);
        builder = builder.proxy(
            Proxy::https(proxy)
                .map_err(|e| Error::Config(format!("invalid https_proxy '{proxy}': {e}")))?,
        );
    }

    builder
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}
