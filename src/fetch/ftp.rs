// src/fetch/ftp.rs

//! FTP retrieval
//!
//! Two routes: a plain HTTP/1.0 `GET ftp://...` through `ftp_proxy`, or a
//! minimal anonymous passive-mode session (USER, PASS, TYPE I, PASV, RETR).

use crate::error::{Error, Result};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use tracing::debug;
use url::Url;

use super::FetchConfig;

fn download_error(url: &Url, message: impl std::fmt::Display) -> Error {
    Error::Download(format!("{url}: {message}"))
}

fn connect(host: &str, port: u16, config: &FetchConfig) -> io::Result<TcpStream> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"));
    for addr in (host, port).to_socket_addrs()? {
        match connect_addr(&addr, config) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

fn connect_addr(addr: &SocketAddr, config: &FetchConfig) -> io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(addr, config.connect_timeout)?;
    stream.set_read_timeout(Some(config.read_timeout))?;
    stream.set_write_timeout(Some(config.read_timeout))?;
    Ok(stream)
}

/// Fetch an `ftp://` URL through an HTTP proxy
///
/// The proxy sees `GET ftp://host/path HTTP/1.0` and answers with the file.
pub fn fetch_via_proxy(
    proxy: &str,
    url: &Url,
    dest: &mut dyn Write,
    config: &FetchConfig,
) -> Result<u64> {
    let proxy_url = Url::parse(proxy)
        .map_err(|e| Error::Config(format!("invalid ftp_proxy '{proxy}': {e}")))?;
    let proxy_host = proxy_url
        .host_str()
        .ok_or_else(|| Error::Config(format!("ftp_proxy '{proxy}' has no host")))?;
    let proxy_port = proxy_url.port_or_known_default().unwrap_or(80);

    debug!("Fetching {} via proxy {}:{}", url, proxy_host, proxy_port);

    let mut stream =
        connect(proxy_host, proxy_port, config).map_err(|e| download_error(url, e))?;
    let host = url.host_str().unwrap_or_default();
    write!(stream, "GET {url} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n")
        .map_err(|e| download_error(url, e))?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .map_err(|e| download_error(url, e))?;

    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| download_error(url, format!("bad proxy response '{}'", status_line.trim())))?;
    if status >= 400 {
        return Err(download_error(url, format!("proxy answered {}", status_line.trim())));
    }

    // Skip headers
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(|e| download_error(url, e))?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    io::copy(&mut reader, dest).map_err(|e| download_error(url, e))
}

/// A control connection reply: code plus the text of its last line
struct Reply {
    code: u16,
    text: String,
}

struct Control {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Control {
    fn open(host: &str, port: u16, config: &FetchConfig) -> io::Result<Self> {
        let stream = connect(host, port, config)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn read_reply(&mut self) -> io::Result<Reply> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
        }
        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad reply '{}'", line.trim())))?;

        // Multi-line replies start with "123-" and end with "123 "
        if line.as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                line.clear();
                if self.reader.read_line(&mut line)? == 0 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
                }
                if line.starts_with(&terminator) {
                    break;
                }
            }
        }

        Ok(Reply {
            code,
            text: line.trim_end().to_string(),
        })
    }

    fn command(&mut self, command: &str) -> io::Result<Reply> {
        write!(self.writer, "{command}\r\n")?;
        self.writer.flush()?;
        self.read_reply()
    }
}

fn expect(reply: Reply, allowed: &[u16], what: &str) -> io::Result<Reply> {
    if allowed.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(io::Error::other(format!("{what} rejected: {}", reply.text)))
    }
}

/// Parse the address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply
fn parse_pasv(text: &str) -> Option<(String, u16)> {
    let start = text.find('(')?;
    let end = text[start..].find(')')? + start;
    let numbers: Vec<u16> = text[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse().ok())
        .collect::<Option<_>>()?;
    if numbers.len() != 6 || numbers.iter().any(|n| *n > 255) {
        return None;
    }
    let host = format!("{}.{}.{}.{}", numbers[0], numbers[1], numbers[2], numbers[3]);
    Some((host, numbers[4] * 256 + numbers[5]))
}

/// Retrieve an `ftp://` URL with an anonymous passive-mode session
pub fn fetch_passive(url: &Url, dest: &mut dyn Write, config: &FetchConfig) -> Result<u64> {
    let host = url
        .host_str()
        .ok_or_else(|| download_error(url, "no host"))?;
    let port = url.port().unwrap_or(21);
    let path = urlencoding::decode(url.path().trim_start_matches('/'))
        .map_err(|e| download_error(url, e))?
        .into_owned();

    let user = match url.username() {
        "" => "anonymous".to_string(),
        name => urlencoding::decode(name)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| name.to_string()),
    };
    let password = url.password().unwrap_or("anonymous@").to_string();

    debug!("Fetching {} over passive FTP", url);
    retrieve(host, port, &user, &password, &path, dest, config).map_err(|e| download_error(url, e))
}

fn retrieve(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    path: &str,
    dest: &mut dyn Write,
    config: &FetchConfig,
) -> io::Result<u64> {
    let mut control = Control::open(host, port, config)?;
    expect(control.read_reply()?, &[220], "greeting")?;

    let reply = control.command(&format!("USER {user}"))?;
    if reply.code == 331 {
        expect(control.command(&format!("PASS {password}"))?, &[230, 202], "PASS")?;
    } else {
        expect(reply, &[230], "USER")?;
    }

    expect(control.command("TYPE I")?, &[200], "TYPE I")?;
    let pasv = expect(control.command("PASV")?, &[227], "PASV")?;
    let (data_host, data_port) = parse_pasv(&pasv.text)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, pasv.text.clone()))?;

    let mut data = connect(&data_host, data_port, config)?;
    expect(control.command(&format!("RETR {path}"))?, &[125, 150], "RETR")?;

    let mut buffer = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = data.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        dest.write_all(&buffer[..n])?;
        total += n as u64;
    }
    drop(data);

    expect(control.read_reply()?, &[226, 250], "transfer")?;
    let _ = control.command("QUIT");
    Ok(total)
}
