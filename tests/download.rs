// tests/download.rs

//! HTTP downloads, digest checks and proxy routing.

mod common;

use common::{HttpStub, ProxyCapture, init_tracing, native_host};
use portcook::fetch::{Downloader, FetchConfig, ProxySettings};
use portcook::hash::{Digest, HashAlgorithm, hash_bytes, sha256};
use portcook::{Environment, Error, FileSpec, Kitchen, KitchenConfig, Recipe};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

const BODY: &[u8] = b"pretend this is a tarball";

fn stub() -> HttpStub {
    init_tracing();
    let mut routes = HashMap::new();
    routes.insert("/dist/foo-1.0.tar.gz".to_string(), BODY.to_vec());
    HttpStub::serve(routes)
}

fn downloader() -> Downloader {
    Downloader::with_proxies(FetchConfig::default(), ProxySettings::none()).unwrap()
}

#[test]
fn test_http_download_with_good_sha256() {
    let server = stub();
    let cache = TempDir::new().unwrap();

    let spec = FileSpec::new(server.url("/dist/foo-1.0.tar.gz"))
        .with_digest(Digest::sha256(sha256(BODY)));
    let path = downloader().download(&spec, cache.path()).unwrap();

    assert_eq!(path, cache.path().join("foo-1.0.tar.gz"));
    assert_eq!(fs::read(&path).unwrap(), BODY);
}

#[test]
fn test_http_download_with_bad_sha256_keeps_nothing() {
    let server = stub();
    let cache = TempDir::new().unwrap();

    let spec = FileSpec::new(server.url("/dist/foo-1.0.tar.gz"))
        .with_digest(Digest::sha256(sha256(b"something else")));
    let err = downloader().download(&spec, cache.path()).unwrap_err();

    assert!(matches!(err, Error::ChecksumMismatch { .. }));
    assert!(err.is_integrity());
    assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 0);
}

#[test]
fn test_legacy_digests() {
    let server = stub();
    let cache = TempDir::new().unwrap();

    for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha1] {
        let spec = FileSpec::new(server.url("/dist/foo-1.0.tar.gz"))
            .with_digest(Digest::new(algorithm, hash_bytes(algorithm, BODY)));
        downloader().download(&spec, cache.path()).unwrap();
    }
}

#[test]
fn test_http_error_falls_through_to_mirror() {
    let server = stub();
    let cache = TempDir::new().unwrap();

    let spec = FileSpec::new(server.url("/gone/foo-1.0.tar.gz"))
        .with_mirror(server.url("/dist/foo-1.0.tar.gz"));
    let path = downloader().download(&spec, cache.path()).unwrap();

    assert_eq!(fs::read(path).unwrap(), BODY);
    assert_eq!(
        server.hits(),
        vec!["/gone/foo-1.0.tar.gz", "/dist/foo-1.0.tar.gz"]
    );
}

#[test]
fn test_cached_file_is_not_downloaded_again() {
    let server = stub();
    let cache = TempDir::new().unwrap();
    let spec = FileSpec::new(server.url("/dist/foo-1.0.tar.gz"))
        .with_digest(Digest::sha256(sha256(BODY)));

    downloader().download(&spec, cache.path()).unwrap();
    downloader().download(&spec, cache.path()).unwrap();
    assert_eq!(server.hits().len(), 1);
}

#[test]
fn test_file_url() {
    let src = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let file = src.path().join("bar-2.0.tar.gz");
    fs::write(&file, BODY).unwrap();

    let url = url::Url::from_file_path(&file).unwrap();
    let path = downloader()
        .download(&FileSpec::new(url.as_str()), cache.path())
        .unwrap();
    assert_eq!(path.file_name().unwrap(), "bar-2.0.tar.gz");
}

#[test]
fn test_https_goes_through_connect() {
    init_tracing();
    let proxy = ProxyCapture::listen();
    let env = Environment::empty().with("https_proxy", proxy.url.as_str());
    let downloader = Downloader::new(FetchConfig::default(), &env).unwrap();

    assert!(downloader.fetch_bytes("https://myserver/path/to/tar.gz").is_err());
    assert!(proxy.request_line().starts_with("CONNECT myserver:443 "));
}

#[test]
fn test_http_goes_through_proxy() {
    init_tracing();
    let proxy = ProxyCapture::listen();
    let env = Environment::empty().with("HTTP_PROXY", proxy.url.as_str());
    let downloader = Downloader::new(FetchConfig::default(), &env).unwrap();

    assert!(downloader.fetch_bytes("http://myserver/path/to/tar.gz").is_err());
    assert!(proxy.request_line().starts_with("GET http://myserver/path/to/tar.gz "));
}

#[test]
fn test_ftp_goes_through_proxy() {
    init_tracing();
    let proxy = ProxyCapture::listen();
    let env = Environment::empty().with("ftp_proxy", proxy.url.as_str());
    let downloader = Downloader::new(FetchConfig::default(), &env).unwrap();

    assert!(downloader.fetch_bytes("ftp://myserver/path/to/tar.gz").is_err());
    assert!(proxy.request_line().starts_with("GET ftp://myserver/path/to/tar.gz "));
}

#[test]
fn test_kitchen_fetch_fills_archive_cache() {
    let server = stub();
    let root = TempDir::new().unwrap();
    let kitchen =
        Kitchen::with_environment(KitchenConfig::in_dir(root.path()), Environment::empty()).unwrap();

    let recipe = Recipe::for_host("foo", "1.0", native_host()).with_file(
        FileSpec::new(server.url("/dist/foo-1.0.tar.gz")).with_digest(Digest::sha256(sha256(BODY))),
    );
    let archives = kitchen.fetch(&recipe).unwrap();

    assert_eq!(archives, vec![root.path().join("ports/archives/foo-1.0.tar.gz")]);
    assert_eq!(fs::read(&archives[0]).unwrap(), BODY);
}

#[test]
fn test_kitchen_fetch_names_the_download_step() {
    let server = stub();
    let root = TempDir::new().unwrap();
    let kitchen =
        Kitchen::with_environment(KitchenConfig::in_dir(root.path()), Environment::empty()).unwrap();

    let recipe = Recipe::for_host("foo", "1.0", native_host())
        .with_file(FileSpec::new(server.url("/missing/foo-1.0.tar.gz")));
    let err = kitchen.fetch(&recipe).unwrap_err();

    assert_eq!(err.step(), Some(portcook::recipe::Step::Download));
    assert!(matches!(err.root(), Error::Download(_)));
}
