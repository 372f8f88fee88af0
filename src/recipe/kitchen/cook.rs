// src/recipe/kitchen/cook.rs

//! Cook: the step-by-step build of a single recipe
//!
//! | Step | Fingerprint | Inputs | Outputs |
//! |------|-------------|--------|---------|
//! | download | URLs, digests, signatures | | cached archives |
//! | extract | archive names, digests | | source tree |
//! | patch | patch paths, content digests | patch files | |
//! | configure | program, arguments, environment | configure script / CMakeLists.txt | Makefile / CMakeCache.txt |
//! | compile | make invocation, configure fingerprint | Makefile | |
//! | install | install invocation, prefix | Makefile | prefix |

use crate::error::{Error, Result};
use crate::hash::sha256;
use crate::recipe::format::{BuildSystem, FileSpec, Recipe};
use crate::recipe::paths::RecipePaths;
use crate::recipe::Step;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::archive::{ArchiveKind, external_extract, extract_tarball, list_dirs, patch_command};
use super::config::CookResult;
use super::runner::Invocation;
use super::stamp::{StepCheck, StepOutcome, StepTracker};
use super::Kitchen;

#[derive(Serialize)]
struct DownloadConfig<'a> {
    files: &'a [FileSpec],
}

#[derive(Serialize)]
struct ExtractConfig {
    archives: Vec<(String, Option<String>)>,
}

#[derive(Serialize)]
struct PatchConfig {
    patches: Vec<(PathBuf, String)>,
}

#[derive(Serialize)]
struct CommandConfig<'a> {
    program: &'a str,
    args: &'a [String],
    env: &'a BTreeMap<String, String>,
    cwd: &'a Path,
    unescape: bool,
}

impl<'a> From<&'a Invocation> for CommandConfig<'a> {
    fn from(inv: &'a Invocation) -> Self {
        Self {
            program: &inv.program,
            args: &inv.args,
            env: &inv.env,
            cwd: &inv.cwd,
            unescape: inv.unescape,
        }
    }
}

#[derive(Serialize)]
struct CompileConfig<'a> {
    command: CommandConfig<'a>,
    configure: String,
}

#[derive(Serialize)]
struct InstallConfig<'a> {
    command: CommandConfig<'a>,
    prefix: &'a Path,
}

/// A single cook operation
pub struct Cook<'a> {
    kitchen: &'a Kitchen,
    recipe: &'a Recipe,
    paths: RecipePaths,
    tracker: StepTracker<'a>,
    steps: Vec<(Step, StepOutcome)>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(kitchen: &'a Kitchen, recipe: &'a Recipe) -> Result<Self> {
        recipe.validate()?;
        let paths = kitchen.paths(recipe)?;
        fs::create_dir_all(&paths.tmp)?;

        Ok(Self {
            kitchen,
            recipe,
            tracker: StepTracker::new(kitchen.stamps.as_ref(), paths.tmp.clone()),
            paths,
            steps: Vec::new(),
        })
    }

    pub fn recipe(&self) -> &Recipe {
        self.recipe
    }

    pub fn paths(&self) -> &RecipePaths {
        &self.paths
    }

    /// Cached archive locations, in recipe order
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        self.recipe
            .files
            .iter()
            .map(|f| self.paths.archives.join(f.file_name()))
            .collect()
    }

    fn is_local(&self) -> bool {
        self.paths.source_directory.is_some()
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) -> StepOutcome {
        self.steps.retain(|(s, _)| *s != step);
        self.steps.push((step, outcome));
        outcome
    }

    fn run_step<F>(&mut self, step: Step, check: Result<StepCheck>, action: F) -> Result<StepOutcome>
    where
        F: FnOnce(&Self) -> Result<()>,
    {
        let this: &Self = self;
        let outcome = check
            .and_then(|check| {
                debug!("{} fingerprint {}", step, check.fingerprint);
                this.tracker.run(step, &check, || {
                    info!("Running {} for {}", step, this.recipe.full_name());
                    action(this)
                })
            })
            .map_err(|e| e.in_step(step))?;
        Ok(self.record(step, outcome))
    }

    /// The check `step` would be judged by right now
    pub fn step_check(&self, step: Step) -> Result<StepCheck> {
        match step {
            Step::Download => StepCheck::new(&DownloadConfig {
                files: &self.recipe.files,
            })
            .map(|c| c.with_outputs(self.archive_paths())),
            Step::Extract => StepCheck::new(&ExtractConfig {
                archives: self
                    .recipe
                    .files
                    .iter()
                    .map(|f| (f.file_name(), f.digest.as_ref().map(|d| d.to_prefixed_string())))
                    .collect(),
            })
            .map(|c| c.with_outputs([self.paths.work_path()])),
            Step::Patch => {
                let mut patches = Vec::new();
                for patch in &self.recipe.patch_files {
                    let content = fs::read(patch).map_err(|e| {
                        Error::InvalidArgument(format!("patch {}: {e}", patch.display()))
                    })?;
                    patches.push((patch.clone(), sha256(&content)));
                }
                StepCheck::new(&PatchConfig { patches })
                    .map(|c| c.with_inputs(self.recipe.patch_files.iter().cloned()))
            }
            Step::Configure => {
                let inv = self.configure_invocation();
                let (input, output) = match self.recipe.options.build_system {
                    BuildSystem::Autotools => ("configure", "Makefile"),
                    BuildSystem::Cmake => ("CMakeLists.txt", "CMakeCache.txt"),
                };
                StepCheck::new(&CommandConfig::from(&inv)).map(|c| {
                    c.with_inputs([self.paths.work_path().join(input)])
                        .with_outputs([self.paths.build_path().join(output)])
                })
            }
            Step::Compile => {
                let inv = self.compile_invocation();
                let configure = self.step_check(Step::Configure)?.fingerprint;
                StepCheck::new(&CompileConfig {
                    command: CommandConfig::from(&inv),
                    configure,
                })
                .map(|c| c.with_inputs([self.makefile()]))
            }
            Step::Install => {
                let inv = self.install_invocation();
                StepCheck::new(&InstallConfig {
                    command: CommandConfig::from(&inv),
                    prefix: &self.paths.port,
                })
                .map(|c| {
                    c.with_inputs([self.makefile()])
                        .with_outputs([self.paths.port.clone()])
                })
            }
        }
    }

    fn makefile(&self) -> PathBuf {
        self.paths.build_path().join("Makefile")
    }

    fn base_invocation(&self, step: Step, program: String) -> Invocation {
        Invocation::new(step, program, self.paths.build_path())
            .log_to(self.paths.log_path(step))
            .unescape(self.recipe.options.unescape_commands)
    }

    /// The configure command for the recipe's build system
    pub fn configure_invocation(&self) -> Invocation {
        let tools = self.kitchen.tools(self.recipe);
        let options = &self.recipe.options;
        let work = self.paths.work_path();
        let prefix = self.paths.port.to_string_lossy().into_owned();

        let inv = match options.build_system {
            BuildSystem::Autotools => {
                let option_args = self.recipe.configure_options.iter().map(|(name, value)| {
                    let flag = if name.starts_with('-') {
                        name.clone()
                    } else {
                        format!("--{name}")
                    };
                    if value.is_empty() {
                        flag
                    } else {
                        format!("{flag}={value}")
                    }
                });

                self.base_invocation(Step::Configure, "sh".to_string())
                    .arg(work.join("configure").to_string_lossy())
                    .arg(format!("--host={}", self.recipe.host))
                    .args(["--enable-static", "--disable-shared"])
                    .args(option_args)
                    .args(options.configure_args.iter().cloned())
                    .arg(format!("--prefix={prefix}"))
            }
            BuildSystem::Cmake => {
                let source = if self.is_local() {
                    work.to_string_lossy().into_owned()
                } else {
                    ".".to_string()
                };
                self.base_invocation(Step::Configure, tools.cmake())
                    .args(tools.cmake_generator_args(self.kitchen.generator.as_ref()))
                    .args(tools.cmake_toolchain_args())
                    .args(
                        self.recipe
                            .configure_options
                            .iter()
                            .map(|(name, value)| format!("-D{name}={value}")),
                    )
                    .args(options.configure_args.iter().cloned())
                    .arg(format!("-DCMAKE_INSTALL_PREFIX={prefix}"))
                    .arg(source)
            }
        };

        inv.env("CC", tools.cc()).env("CXX", tools.cxx())
    }

    /// `make [-jN]`
    pub fn compile_invocation(&self) -> Invocation {
        let make = self.kitchen.tools(self.recipe).make();
        let jobs = self
            .recipe
            .options
            .jobs
            .filter(|_| make != "nmake")
            .map(|n| format!("-j{n}"));
        self.base_invocation(Step::Compile, make).args(jobs)
    }

    /// `make install`
    pub fn install_invocation(&self) -> Invocation {
        let make = self.kitchen.tools(self.recipe).make();
        self.base_invocation(Step::Install, make).arg("install")
    }

    /// Download and verify every file into the archive cache
    pub fn download(&mut self) -> Result<StepOutcome> {
        if self.is_local() {
            return Ok(self.record(Step::Download, StepOutcome::Skipped));
        }
        let check = self.step_check(Step::Download);
        self.run_step(Step::Download, check, |cook| {
            for file in &cook.recipe.files {
                cook.kitchen.downloader.download(file, &cook.paths.archives)?;
            }
            Ok(())
        })
    }

    /// Unpack every archive into the temp directory
    pub fn extract(&mut self) -> Result<StepOutcome> {
        if self.is_local() {
            return Ok(self.record(Step::Extract, StepOutcome::Skipped));
        }
        let check = self.step_check(Step::Extract);
        self.run_step(Step::Extract, check, |cook| {
            // Stale trees from an earlier extraction would mix with the new one
            for dir in list_dirs(&cook.paths.tmp)? {
                if dir.file_name().is_some_and(|n| n != "build") {
                    debug!("Removing previous tree {}", dir.display());
                    fs::remove_dir_all(&dir)?;
                }
            }

            let log = cook.paths.log_path(Step::Extract);
            for archive in cook.archive_paths() {
                info!("Extracting {}", archive.display());
                if ArchiveKind::detect(&archive).is_native() {
                    extract_tarball(&archive, &cook.paths.tmp)?;
                } else {
                    cook.kitchen
                        .runner
                        .run(&external_extract(&archive, &cook.paths.tmp, &log))?;
                }
            }
            Ok(())
        })
    }

    /// Apply the recipe's patches in order
    pub fn patch(&mut self) -> Result<StepOutcome> {
        if self.is_local() {
            return Ok(self.record(Step::Patch, StepOutcome::Skipped));
        }
        let check = self.step_check(Step::Patch);
        self.run_step(Step::Patch, check, |cook| {
            if cook.recipe.patch_files.is_empty() {
                return Ok(());
            }
            let scratch = tempfile::tempdir()?;
            let work = cook.paths.work_path();
            let log = cook.paths.log_path(Step::Patch);
            for patch in &cook.recipe.patch_files {
                info!("Applying patch {}", patch.display());
                let inv = patch_command(patch, &work, scratch.path(), &log)?;
                cook.kitchen.runner.run(&inv)?;
            }
            Ok(())
        })
    }

    /// Run configure (autotools) or cmake
    pub fn configure(&mut self) -> Result<StepOutcome> {
        let check = self.step_check(Step::Configure);
        self.run_step(Step::Configure, check, |cook| {
            fs::create_dir_all(cook.paths.build_path())?;
            cook.kitchen.runner.run(&cook.configure_invocation())
        })
    }

    pub fn compile(&mut self) -> Result<StepOutcome> {
        let check = self.step_check(Step::Compile);
        self.run_step(Step::Compile, check, |cook| {
            cook.kitchen.runner.run(&cook.compile_invocation())
        })
    }

    pub fn install(&mut self) -> Result<StepOutcome> {
        let check = self.step_check(Step::Install);
        self.run_step(Step::Install, check, |cook| {
            cook.kitchen.runner.run(&cook.install_invocation())
        })
    }

    /// Whether the install step is covered by a valid stamp
    pub fn is_installed(&self) -> Result<bool> {
        let check = self.step_check(Step::Install)?;
        self.tracker.is_done(Step::Install, &check)
    }

    /// Run every remaining step in order
    pub fn run_all(mut self) -> Result<CookResult> {
        self.download()?;
        self.extract()?;
        self.patch()?;
        self.configure()?;
        self.compile()?;
        self.install()?;
        Ok(self.finish())
    }

    /// Summarize the steps run so far
    pub fn finish(self) -> CookResult {
        let archives = if self.is_local() {
            Vec::new()
        } else {
            self.archive_paths()
        };
        CookResult {
            recipe: self.recipe.full_name(),
            steps: self.steps,
            install_path: self.paths.port,
            archives,
        }
    }
}
