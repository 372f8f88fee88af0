// src/recipe/kitchen/tools.rs

//! Build tool selection
//!
//! Every logical tool resolves in the same order:
//!
//! | Tool | Environment | Recipe option | Default |
//! |------|-------------|---------------|---------|
//! | make | `MAKE` | `make_command` | `nmake` (MSVC), `make` |
//! | cmake | `CMAKE` | `cmake_command` | `cmake` |
//! | C compiler | `CC` | `gcc_command` | `cl` (MSVC), `<host>-gcc` when cross, `cc` |
//! | C++ compiler | `CXX` | `cxx_command` | `cl` (MSVC), `<host>-g++` when cross, `c++` |

use crate::environment::Environment;
use crate::recipe::format::{RecipeOptions, build_triple, same_triple};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

use super::runner::find_program;

/// Toolchain family of the build machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unix,
    /// Visual Studio toolchain (`cl`, `nmake`)
    Msvc,
    /// MinGW/MSYS shells on Windows
    Mingw,
}

impl Platform {
    /// The platform this crate was compiled for
    pub fn current() -> Self {
        if cfg!(all(windows, target_env = "msvc")) {
            Self::Msvc
        } else if cfg!(windows) {
            Self::Mingw
        } else {
            Self::Unix
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Reports the generator cmake uses when none is given
pub trait GeneratorDetector: Send + Sync {
    fn default_generator(&self, cmake: &str) -> Option<String>;
}

/// Asks `cmake --help` for its default generator
#[derive(Debug, Clone, Copy, Default)]
pub struct CmakeHelpDetector;

impl GeneratorDetector for CmakeHelpDetector {
    fn default_generator(&self, cmake: &str) -> Option<String> {
        let output = match Command::new(cmake).arg("--help").output() {
            Ok(output) => output,
            Err(e) => {
                debug!("Could not run {} --help: {}", cmake, e);
                return None;
            }
        };
        parse_default_generator(&String::from_utf8_lossy(&output.stdout))
    }
}

/// A detector with a fixed answer
#[derive(Debug, Clone, Default)]
pub struct FixedGenerator(pub Option<String>);

impl GeneratorDetector for FixedGenerator {
    fn default_generator(&self, _cmake: &str) -> Option<String> {
        self.0.clone()
    }
}

static DEFAULT_GENERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\*\s*(.+?)\s*(?:\[arch\])?\s*=").expect("generator pattern is valid")
});

/// Extract the generator marked with `*` from `cmake --help` output
pub fn parse_default_generator(help: &str) -> Option<String> {
    DEFAULT_GENERATOR
        .captures(help)
        .map(|caps| caps[1].trim().to_string())
        .filter(|g| !g.is_empty())
}

/// Resolves tool names for one recipe
pub struct ToolResolver<'a> {
    env: &'a Environment,
    options: &'a RecipeOptions,
    platform: Platform,
    host: &'a str,
}

impl<'a> ToolResolver<'a> {
    pub fn new(
        env: &'a Environment,
        options: &'a RecipeOptions,
        platform: Platform,
        host: &'a str,
    ) -> Self {
        Self {
            env,
            options,
            platform,
            host,
        }
    }

    pub fn make(&self) -> String {
        self.pick("MAKE", &self.options.make_command, || match self.platform {
            Platform::Msvc => "nmake".to_string(),
            _ => "make".to_string(),
        })
    }

    pub fn cmake(&self) -> String {
        self.pick("CMAKE", &self.options.cmake_command, || "cmake".to_string())
    }

    pub fn cc(&self) -> String {
        self.pick("CC", &self.options.gcc_command, || self.compiler_default("gcc", "cc"))
    }

    pub fn cxx(&self) -> String {
        self.pick("CXX", &self.options.cxx_command, || self.compiler_default("g++", "c++"))
    }

    /// Whether the recipe targets a different triple than the build machine
    pub fn is_cross(&self) -> bool {
        !same_triple(self.host, &build_triple(self.env))
    }

    fn pick(&self, var: &str, option: &Option<String>, default: impl FnOnce() -> String) -> String {
        if let Some(value) = self.env.get(var) {
            return value.to_string();
        }
        match option.as_deref().filter(|o| !o.is_empty()) {
            Some(option) => option.to_string(),
            None => default(),
        }
    }

    fn compiler_default(&self, gnu_name: &str, fallback: &str) -> String {
        if self.platform == Platform::Msvc {
            return "cl".to_string();
        }
        if self.is_cross() {
            let prefixed = format!("{}-{}", self.host, gnu_name);
            if find_program(&prefixed).is_some() {
                return prefixed;
            }
        }
        fallback.to_string()
    }

    /// `-G <generator>` arguments for cmake, if any are needed
    pub fn cmake_generator_args(&self, detector: &dyn GeneratorDetector) -> Vec<String> {
        match self.platform {
            Platform::Unix => Vec::new(),
            Platform::Msvc => vec!["-G".to_string(), "NMake Makefiles".to_string()],
            Platform::Mingw => match detector.default_generator(&self.cmake()) {
                Some(generator) if generator != "Unix Makefiles" => {
                    debug!("cmake defaults to {}, using MSYS Makefiles", generator);
                    vec!["-G".to_string(), "MSYS Makefiles".to_string()]
                }
                _ => Vec::new(),
            },
        }
    }

    /// Compiler selection plus, when cross compiling, the target system
    pub fn cmake_toolchain_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.is_cross() {
            let mut parts = self.host.split('-');
            let processor = parts.next().unwrap_or_default();
            let system = system_name(self.host);

            if let Some(system) = system {
                args.push(format!("-DCMAKE_SYSTEM_NAME={system}"));
            }
            if !processor.is_empty() {
                args.push(format!("-DCMAKE_SYSTEM_PROCESSOR={processor}"));
            }
        }

        args.push(format!("-DCMAKE_C_COMPILER={}", self.cc()));
        args.push(format!("-DCMAKE_CXX_COMPILER={}", self.cxx()));
        args
    }
}

fn system_name(host: &str) -> Option<&'static str> {
    if host.contains("linux") {
        Some("Linux")
    } else if host.contains("darwin") || host.contains("apple") {
        Some("Darwin")
    } else if host.contains("mingw") || host.contains("windows") {
        Some("Windows")
    } else if host.contains("freebsd") {
        Some("FreeBSD")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::format::default_host;

    const HELP: &str = "\
Generators

The following generators are available on this platform (* marks default):
  Visual Studio 17 2022        = Generates Visual Studio 2022 project files.
                                 Use -A option to specify architecture.
* Visual Studio 16 2019 [arch] = Generates Visual Studio 2019 project files.
  Unix Makefiles               = Generates standard UNIX makefiles.
";

    fn options(make: Option<&str>) -> RecipeOptions {
        RecipeOptions {
            make_command: make.map(str::to_string),
            ..RecipeOptions::default()
        }
    }

    #[test]
    fn test_env_beats_option_beats_default() {
        let host = default_host(&Environment::empty());
        let opts = options(Some("xyzzy"));

        let env = Environment::empty().with("MAKE", "asdf");
        assert_eq!(ToolResolver::new(&env, &opts, Platform::Unix, &host).make(), "asdf");

        let env = Environment::empty();
        assert_eq!(ToolResolver::new(&env, &opts, Platform::Unix, &host).make(), "xyzzy");

        let none = options(None);
        assert_eq!(ToolResolver::new(&env, &none, Platform::Unix, &host).make(), "make");
        assert_eq!(ToolResolver::new(&env, &none, Platform::Msvc, &host).make(), "nmake");
    }

    #[test]
    fn test_compiler_defaults() {
        let host = default_host(&Environment::empty());
        let env = Environment::empty().with("CXX", "clang++");
        let opts = options(None);
        let tools = ToolResolver::new(&env, &opts, Platform::Unix, &host);
        assert_eq!(tools.cc(), "cc");
        assert_eq!(tools.cxx(), "clang++");
        assert!(!tools.is_cross());

        let msvc = ToolResolver::new(&env, &opts, Platform::Msvc, &host);
        assert_eq!(msvc.cc(), "cl");
    }

    #[test]
    fn test_parse_default_generator() {
        assert_eq!(
            parse_default_generator(HELP).as_deref(),
            Some("Visual Studio 16 2019")
        );
        assert_eq!(
            parse_default_generator("* Unix Makefiles = Generates standard UNIX makefiles.")
                .as_deref(),
            Some("Unix Makefiles")
        );
        assert_eq!(parse_default_generator("garbage"), None);
    }

    #[test]
    fn test_generator_selection() {
        let env = Environment::empty();
        let opts = options(None);
        let host = "x86_64-w64-mingw32";

        let unix = ToolResolver::new(&env, &opts, Platform::Unix, host);
        assert!(unix.cmake_generator_args(&CmakeHelpDetector).is_empty());

        let msvc = ToolResolver::new(&env, &opts, Platform::Msvc, host);
        assert_eq!(msvc.cmake_generator_args(&FixedGenerator(None)), ["-G", "NMake Makefiles"]);

        let mingw = ToolResolver::new(&env, &opts, Platform::Mingw, host);
        let vs = FixedGenerator(Some("Visual Studio 16 2019".to_string()));
        assert_eq!(mingw.cmake_generator_args(&vs), ["-G", "MSYS Makefiles"]);
        let unix_default = FixedGenerator(Some("Unix Makefiles".to_string()));
        assert!(mingw.cmake_generator_args(&unix_default).is_empty());
        assert!(mingw.cmake_generator_args(&FixedGenerator(None)).is_empty());
    }

    #[test]
    fn test_cross_toolchain_args() {
        let env = Environment::empty().with("CC", "arm-cc").with("CXX", "arm-c++");
        let opts = options(None);
        let tools = ToolResolver::new(&env, &opts, Platform::Unix, "armv7-unknown-linux-gnueabihf");
        assert_eq!(
            tools.cmake_toolchain_args(),
            [
                "-DCMAKE_SYSTEM_NAME=Linux",
                "-DCMAKE_SYSTEM_PROCESSOR=armv7",
                "-DCMAKE_C_COMPILER=arm-cc",
                "-DCMAKE_CXX_COMPILER=arm-c++",
            ]
        );
    }

    #[test]
    fn test_rustc_style_native_triple_is_not_cross() {
        let env = Environment::empty()
            .with("HOST", "x86_64-unknown-linux-gnu")
            .with("CC", "cc")
            .with("CXX", "c++");
        let opts = options(None);

        for host in ["x86_64-unknown-linux-gnu", "x86_64-linux-gnu"] {
            let tools = ToolResolver::new(&env, &opts, Platform::Unix, host);
            assert!(!tools.is_cross());
            assert_eq!(
                tools.cmake_toolchain_args(),
                ["-DCMAKE_C_COMPILER=cc", "-DCMAKE_CXX_COMPILER=c++"]
            );
        }

        let arm = ToolResolver::new(&env, &opts, Platform::Unix, "aarch64-unknown-linux-gnu");
        assert!(arm.is_cross());
    }
}
