// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use portcook::recipe::{CommandRunner, Invocation, Step};
use portcook::{Environment, Error, FileSpec, Kitchen, KitchenConfig, Recipe, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Route `tracing` output to the test harness once per binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Read one HTTP request head and return its lines.
fn read_request_head(stream: &TcpStream) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                lines.push(line);
            }
        }
    }
    lines
}

fn respond(mut stream: &TcpStream, status: u16, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

/// Loopback HTTP server answering fixed paths; anything else is a 404.
pub struct HttpStub {
    pub addr: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub fn serve(routes: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&hits);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let head = read_request_head(&stream);
                let path = head
                    .first()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                recorded.lock().unwrap().push(path.clone());
                match routes.get(&path) {
                    Some(body) => respond(&stream, 200, body),
                    None => respond(&stream, 404, b"not found"),
                }
            }
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Request paths seen so far
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

/// Proxy that records the first request line of one connection, then fails it.
pub struct ProxyCapture {
    pub url: String,
    lines: Receiver<String>,
}

impl ProxyCapture {
    pub fn listen() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let head = read_request_head(&stream);
                let _ = tx.send(head.first().cloned().unwrap_or_default());
                respond(&stream, 502, b"");
                // Let the client read the answer before the socket closes
                let mut rest = Vec::new();
                let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
                let _ = (&stream).read_to_end(&mut rest);
            }
        });

        Self { url, lines: rx }
    }

    /// The captured request line
    pub fn request_line(&self) -> String {
        self.lines.recv_timeout(Duration::from_secs(10)).unwrap()
    }
}

/// Command runner that records invocations and fakes their effects.
///
/// Configure writes the build file the next steps expect; install creates
/// `include` and `lib` under the configured prefix.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_on: Mutex<Option<Step>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, step: Option<Step>) {
        *self.fail_on.lock().unwrap() = step;
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.calls().iter().map(|c| c.step).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn prefix(&self) -> Option<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|c| c.step == Step::Configure)
            .flat_map(|c| c.args.clone())
            .find_map(|a| {
                a.strip_prefix("--prefix=")
                    .or_else(|| a.strip_prefix("-DCMAKE_INSTALL_PREFIX="))
                    .map(PathBuf::from)
            })
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        self.calls.lock().unwrap().push(invocation.clone());

        if *self.fail_on.lock().unwrap() == Some(invocation.step) {
            return Err(Error::CommandFailed {
                step: invocation.step.to_string(),
                program: invocation.program.clone(),
                exit_code: Some(1),
                log: invocation.log_path.clone(),
            });
        }

        match invocation.step {
            Step::Configure => {
                fs::create_dir_all(&invocation.cwd)?;
                fs::write(invocation.cwd.join("Makefile"), "all:\n")?;
                if invocation.args.iter().any(|a| a.starts_with("-DCMAKE_INSTALL_PREFIX=")) {
                    fs::write(invocation.cwd.join("CMakeCache.txt"), "")?;
                }
            }
            Step::Install => {
                if let Some(prefix) = self.prefix() {
                    fs::create_dir_all(prefix.join("include"))?;
                    fs::create_dir_all(prefix.join("lib"))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Write `<name>-<version>/configure` into a gzipped tarball.
pub fn write_tarball(path: &Path, name: &str, version: &str) {
    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let content = b"#!/bin/sh\nexit 0\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(
            &mut header,
            format!("{name}-{version}/configure"),
            &content[..],
        )
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

/// Host triple the kitchen treats as native
pub fn native_host() -> String {
    portcook::recipe::default_host(&Environment::empty())
}

/// Workspace with a local tarball recipe and a kitchen using `runner`.
pub struct Fixture {
    pub dir: TempDir,
    pub tarball: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let tarball = dir.path().join("libfoo-1.0.tar.gz");
        write_tarball(&tarball, "libfoo", "1.0");
        Self { dir, tarball }
    }

    pub fn recipe(&self) -> Recipe {
        Recipe::for_host("libfoo", "1.0", native_host())
            .with_file(FileSpec::new(self.tarball.to_string_lossy()))
    }

    pub fn kitchen(&self, env: Environment, runner: Arc<FakeRunner>) -> Kitchen {
        let config = KitchenConfig::in_dir(&self.dir.path().join("work"));
        Kitchen::with_environment(config, env)
            .unwrap()
            .with_runner(runner)
    }
}
