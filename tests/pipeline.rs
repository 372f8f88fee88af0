// tests/pipeline.rs

//! Cooking recipes end to end with a recording command runner.

mod common;

use common::{FakeRunner, Fixture, native_host};
use portcook::recipe::{FixedGenerator, Platform, Step, StepOutcome};
use portcook::{
    BuildEnvironment, BuildSystem, Environment, FlagComposer, Kitchen, KitchenConfig, Recipe,
    RecipeOptions,
};
use std::fs;
use std::sync::Arc;

#[test]
fn test_cook_runs_every_step_then_nothing() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty(), runner.clone());
    let recipe = fixture.recipe();

    let result = kitchen.cook(&recipe).unwrap();
    assert_eq!(result.executed(), Step::ALL.to_vec());
    assert_eq!(runner.steps(), vec![Step::Configure, Step::Compile, Step::Install]);
    assert!(result.install_path.join("lib").is_dir());
    assert!(result.archives[0].ends_with("archives/libfoo-1.0.tar.gz"));

    runner.clear();
    let again = kitchen.cook(&recipe).unwrap();
    assert!(again.executed().is_empty());
    assert!(runner.calls().is_empty());
}

#[test]
fn test_configure_command_line() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty(), runner.clone());
    let recipe = fixture
        .recipe()
        .with_configure_option("enable-foo", "")
        .with_configure_option("with-bar", "baz");

    let result = kitchen.cook(&recipe).unwrap();

    let configure = &runner.calls()[0];
    assert_eq!(configure.program, "sh");
    assert!(configure.args[0].ends_with("libfoo-1.0/configure"));
    assert_eq!(
        &configure.args[1..],
        [
            format!("--host={}", native_host()),
            "--enable-static".to_string(),
            "--disable-shared".to_string(),
            "--enable-foo".to_string(),
            "--with-bar=baz".to_string(),
            format!("--prefix={}", result.install_path.display()),
        ]
    );
    assert!(configure.env.contains_key("CC"));
    assert!(configure.env.contains_key("CXX"));
}

#[test]
fn test_changed_option_reruns_configure_and_later() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty(), runner.clone());

    kitchen.cook(&fixture.recipe()).unwrap();
    runner.clear();

    let changed = fixture.recipe().with_configure_option("enable-foo", "");
    let result = kitchen.cook(&changed).unwrap();

    assert_eq!(result.outcome(Step::Download), Some(StepOutcome::Skipped));
    assert_eq!(result.outcome(Step::Extract), Some(StepOutcome::Skipped));
    assert_eq!(result.executed(), vec![Step::Configure, Step::Compile, Step::Install]);
    assert!(runner.calls()[0].args.contains(&"--enable-foo".to_string()));
}

#[test]
fn test_failed_step_is_named_and_not_stamped() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty(), runner.clone());
    let recipe = fixture.recipe();

    runner.fail_on(Some(Step::Compile));
    let err = kitchen.cook(&recipe).unwrap_err();
    assert_eq!(err.step(), Some(Step::Compile));
    assert!(matches!(err.root(), portcook::Error::CommandFailed { .. }));
    assert!(!kitchen.is_cooked(&recipe).unwrap());

    runner.fail_on(None);
    runner.clear();
    kitchen.cook(&recipe).unwrap();
    assert_eq!(runner.steps(), vec![Step::Compile, Step::Install]);
}

#[test]
fn test_make_from_environment_beats_recipe_option() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty().with("MAKE", "asdf"), runner.clone());
    let recipe = fixture.recipe().with_options(RecipeOptions {
        make_command: Some("xyzzy".to_string()),
        jobs: Some(4),
        ..RecipeOptions::default()
    });

    kitchen.cook(&recipe).unwrap();

    let calls = runner.calls();
    let compile = calls.iter().find(|c| c.step == Step::Compile).unwrap();
    assert_eq!(compile.program, "asdf");
    assert_eq!(compile.args, ["-j4"]);
    let install = calls.iter().find(|c| c.step == Step::Install).unwrap();
    assert_eq!(install.program, "asdf");
    assert_eq!(install.args, ["install"]);
}

#[test]
fn test_is_cooked_tracks_configuration() {
    let fixture = Fixture::new();
    let kitchen = fixture.kitchen(Environment::empty(), FakeRunner::new());
    let recipe = fixture.recipe();

    assert!(!kitchen.is_cooked(&recipe).unwrap());
    kitchen.cook(&recipe).unwrap();
    assert!(kitchen.is_cooked(&recipe).unwrap());

    let changed = fixture.recipe().with_configure_option("disable-docs", "");
    assert!(!kitchen.is_cooked(&changed).unwrap());
}

#[test]
fn test_removed_prefix_reinstalls() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty(), runner.clone());
    let recipe = fixture.recipe();

    let result = kitchen.cook(&recipe).unwrap();
    fs::remove_dir_all(&result.install_path).unwrap();

    runner.clear();
    kitchen.cook(&recipe).unwrap();
    assert_eq!(runner.steps(), vec![Step::Install]);
}

#[test]
fn test_local_source_directory_with_cmake() {
    let fixture = Fixture::new();
    let source = fixture.dir.path().join("src");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("CMakeLists.txt"), "project(foo C)\n").unwrap();

    let runner = FakeRunner::new();
    let config = KitchenConfig::in_dir(&fixture.dir.path().join("work")).with_platform(Platform::Unix);
    let kitchen = Kitchen::with_environment(config, Environment::empty())
        .unwrap()
        .with_runner(runner.clone())
        .with_generator_detector(Arc::new(FixedGenerator(Some("Unix Makefiles".to_string()))));

    let recipe = Recipe::for_host("foo", "dev", native_host())
        .with_configure_option("BUILD_TESTING", "OFF")
        .with_options(RecipeOptions {
            build_system: BuildSystem::Cmake,
            source_directory: Some(source.clone()),
            ..RecipeOptions::default()
        });

    let result = kitchen.cook(&recipe).unwrap();
    assert_eq!(result.outcome(Step::Download), Some(StepOutcome::Skipped));
    assert_eq!(result.outcome(Step::Extract), Some(StepOutcome::Skipped));
    assert_eq!(result.outcome(Step::Patch), Some(StepOutcome::Skipped));
    assert!(result.archives.is_empty());

    let configure = &runner.calls()[0];
    assert_eq!(configure.program, "cmake");
    assert!(configure.cwd.ends_with("build"));
    assert!(configure.args.contains(&"-DBUILD_TESTING=OFF".to_string()));
    assert_eq!(configure.args.last().unwrap(), &source.to_string_lossy());
    assert!(!configure.args.contains(&"-G".to_string()));

    runner.clear();
    kitchen.cook(&recipe).unwrap();
    assert!(runner.calls().is_empty());
}

#[test]
fn test_flags_and_activation_after_cook() {
    let fixture = Fixture::new();
    let kitchen = fixture.kitchen(Environment::empty(), FakeRunner::new());
    let recipe = fixture.recipe();
    let result = kitchen.cook(&recipe).unwrap();

    let mut env = BuildEnvironment::new();
    let paths = kitchen.paths(&recipe).unwrap();
    FlagComposer::new(&mut env).add_recipe(&recipe, &paths);

    assert_eq!(
        env.cflags_string(),
        format!("-I{}", result.install_path.join("include").display())
    );
    assert_eq!(
        env.ldflags_string(),
        format!("-L{}", result.install_path.join("lib").display())
    );
    assert_eq!(env.libs_string(), "-lfoo");

    let vars = kitchen.activation_env(&recipe).unwrap();
    assert_eq!(vars["CPATH"], result.install_path.join("include").to_string_lossy());
    assert_eq!(vars["PATH"], "");
}

#[test]
fn test_invalid_recipe_runs_nothing() {
    let fixture = Fixture::new();
    let runner = FakeRunner::new();
    let kitchen = fixture.kitchen(Environment::empty(), runner.clone());

    let err = kitchen
        .cook(&Recipe::for_host("../evil", "1.0", native_host()))
        .unwrap_err();
    assert!(matches!(err, portcook::Error::InvalidArgument(_)));
    assert!(runner.calls().is_empty());
}
