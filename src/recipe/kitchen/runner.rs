// src/recipe/kitchen/runner.rs

//! External command execution for build steps
//!
//! Commands are spawned directly with an argument vector, never through a
//! shell. Combined stdout and stderr go to the step's log file.

use crate::error::{Error, Result};
use crate::recipe::Step;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// One external command of a build step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub step: Step,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
    /// Where combined stdout/stderr is appended
    pub log_path: PathBuf,
    /// Expand backslash escapes in `args` before spawning
    pub unescape: bool,
}

impl Invocation {
    pub fn new(step: Step, program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            step,
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            log_path: PathBuf::new(),
            unescape: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn unescape(mut self, enabled: bool) -> Self {
        self.unescape = enabled;
        self
    }

    /// Arguments as they will be passed to the program
    pub fn effective_args(&self) -> Vec<String> {
        if self.unescape {
            self.args.iter().map(|a| unescape(a)).collect()
        } else {
            self.args.clone()
        }
    }

    /// Human-readable command line, for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.effective_args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes build commands
///
/// The kitchen only talks to this trait, so hosts can route commands through
/// their own executor and tests can record them.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        let program = resolve_program(invocation)?;
        let args = invocation.effective_args();

        debug!(
            "[{}] {} (in {})",
            invocation.step,
            invocation.command_line(),
            invocation.cwd.display()
        );

        if let Some(parent) = invocation.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&invocation.log_path)?;

        let status = Command::new(&program)
            .args(&args)
            .current_dir(&invocation.cwd)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .status()?;

        if !status.success() {
            return Err(Error::CommandFailed {
                step: invocation.step.to_string(),
                program: invocation.program.clone(),
                exit_code: status.code(),
                log: invocation.log_path.clone(),
            });
        }

        Ok(())
    }
}

/// Locate the program on `PATH` (the invocation's own `PATH` wins), or
/// relative to the working directory when it contains a separator
fn resolve_program(invocation: &Invocation) -> Result<PathBuf> {
    let search_path = invocation
        .env
        .get("PATH")
        .cloned()
        .or_else(|| std::env::var("PATH").ok());

    which::which_in(&invocation.program, search_path, &invocation.cwd)
        .map_err(|_| Error::ToolNotFound(invocation.program.clone()))
}

/// Check whether a program can be found on `PATH`
pub fn find_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Expand C-style backslash escapes
///
/// `\t \n \r \0 \a \b \e \f \v \\ \' \"` and `\x00` to `\x7f` are expanded.
/// Arguments stay UTF-8, so `\x80` and above are left as written. Any other
/// escaped character stands for itself, and a trailing backslash is kept.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            't' => out.push('\t'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'x' => {
                let mut hex = String::new();
                while hex.len() < 2 {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if byte.is_ascii() => out.push(char::from(byte)),
                    Ok(_) => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                    Err(_) => out.push('x'),
                }
            }
            other => out.push(other),
        }
    }

    out
}
