// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building, staging and running individual tests.
//!
//! A [`Mode`] combines a [`Compiler`], an [`Environment`] and a [`Launcher`]. The harness is
//! compiled and installed once by [`Mode::prepare`]. After that, [`Mode::build_and_install`] may be
//! called concurrently for different tests, while [`Mode::run_test`] and [`Mode::cleanup`] are
//! called for one test at a time.

use crate::{
    classpath::Classpath,
    command::Command,
    compiler::{CompileRequest, Compiler},
    context::RunContext,
    environment::{Environment, StageRequest, StagedTest},
    errors::{BuildError, CommandError, CompileError, DisplayErrorChain, PrepareError},
    harness::{self, SUCCESS_SENTINEL, TestProperties},
    launcher::{LaunchRequest, Launcher},
    test_run::{RunnerKind, TestResult, TestRun},
    time::stopwatch,
};
use std::{
    error::Error,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tracing::{debug, info, warn};

/// Builds, stages and runs tests against a single execution target.
pub struct Mode {
    context: Arc<RunContext>,
    compiler: Box<dyn Compiler>,
    environment: Box<dyn Environment>,
    launcher: Box<dyn Launcher>,
    timeout: Duration,
    test_classpath: Classpath,
    harness_classpath: OnceLock<Classpath>,
}

impl Mode {
    /// Creates a new mode.
    pub fn new(
        context: Arc<RunContext>,
        compiler: impl Compiler + 'static,
        environment: impl Environment + 'static,
        launcher: impl Launcher + 'static,
    ) -> Self {
        Self {
            context,
            compiler: Box::new(compiler),
            environment: Box::new(environment),
            launcher: Box::new(launcher),
            timeout: Duration::from_secs(600),
            test_classpath: Classpath::new(),
            harness_classpath: OnceLock::new(),
        }
    }

    /// Sets the per-test timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets classpath entries shared by every test, at compile time and at runtime.
    pub fn test_classpath(mut self, classpath: Classpath) -> Self {
        self.test_classpath = classpath;
        self
    }

    /// Returns the per-test timeout.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Compiles the harness for the given runner kinds and prepares the environment.
    ///
    /// Must be called exactly once, before any call to [`Self::build_and_install`].
    pub fn prepare(
        &self,
        runner_kinds: impl IntoIterator<Item = RunnerKind>,
        runner_classpath: &Classpath,
    ) -> Result<(), PrepareError> {
        let sources =
            harness::write_harness_sources(&self.context.harness_sources_dir(), runner_kinds)?;

        let mut classpath = self.test_classpath.clone();
        classpath.add_all(runner_classpath);
        let classes_dir = self.context.harness_classes_dir();
        self.compiler
            .compile(&CompileRequest {
                sources: &sources,
                classpath: &classpath,
                source_path: None,
                output_dir: &classes_dir,
            })
            .map_err(PrepareError::Compile)?;
        debug!(%classes_dir, "compiled harness");

        let harness_classpath = self
            .environment
            .prepare(&classes_dir)
            .map_err(PrepareError::Environment)?;
        info!("prepared environment");

        if self.harness_classpath.set(harness_classpath).is_err() {
            panic!("Mode::prepare called more than once");
        }
        Ok(())
    }

    /// Compiles a test and stages it in the environment.
    ///
    /// On success the test is marked compiled. A compiler rejection records `COMPILE_FAILED` with
    /// the compiler output, and any other failure records `ERROR`.
    pub fn build_and_install(&self, test_run: &TestRun) {
        match self.build_and_install_impl(test_run) {
            Ok(staged) => {
                debug!(qualified_name = test_run.qualified_name(), "built test");
                test_run.set_compiled(staged);
            }
            Err(BuildError::Compile(CompileError::Diagnostics { output })) => {
                record(test_run, TestResult::CompileFailed, output);
            }
            Err(error) => {
                record(test_run, TestResult::Error, error_lines(&error));
            }
        }
    }

    fn build_and_install_impl(&self, test_run: &TestRun) -> Result<StagedTest, BuildError> {
        assert!(
            self.harness_classpath.get().is_some(),
            "Mode::prepare must be called before Mode::build_and_install"
        );

        let mut runtime_classpath = self.test_classpath.clone();
        runtime_classpath.add_all(test_run.runner_classpath());

        let mut compile_classpath = Classpath::of([self.context.harness_classes_dir()]);
        compile_classpath.add_all(&runtime_classpath);

        let classes_dir = self.context.test_classes_dir(test_run.qualified_name());
        self.compiler
            .compile(&CompileRequest {
                sources: &[test_run.test_java().to_owned()],
                classpath: &compile_classpath,
                source_path: Some(test_run.test_directory()),
                output_dir: &classes_dir,
            })
            .map_err(BuildError::Compile)?;

        TestProperties::for_run(test_run)
            .write(&classes_dir)
            .map_err(|error| BuildError::WriteProperties {
                path: classes_dir.join(harness::PROPERTIES_FILE_NAME),
                error,
            })?;

        self.environment
            .stage(&StageRequest {
                test_run,
                classes_dir: &classes_dir,
                classpath: &runtime_classpath,
            })
            .map_err(BuildError::Stage)
    }

    /// Returns the command that would run a built test.
    ///
    /// Returns `None` if the test hasn't been staged.
    pub fn command(&self, test_run: &TestRun) -> Option<Command> {
        let staged = test_run.staged()?;
        let harness_classpath = self.harness_classpath.get()?;
        let mut command = self.launcher.command(&LaunchRequest {
            test_run,
            staged,
            harness_classpath,
        });
        command
            .timeout(Some(self.timeout))
            .permit_non_zero_exit(true);
        Some(command)
    }

    /// Runs a built test and records its result.
    ///
    /// The test passed if and only if the last line of its output is the success sentinel. Does
    /// nothing if the test isn't runnable.
    pub fn run_test(&self, test_run: &TestRun) {
        if !test_run.is_runnable() {
            warn!(
                qualified_name = test_run.qualified_name(),
                "skipping test that isn't runnable"
            );
            return;
        }
        let Some(command) = self.command(test_run) else {
            record(
                test_run,
                TestResult::Error,
                vec!["test was not staged".to_owned()],
            );
            return;
        };

        let start = stopwatch();
        let (result, output) = match command.execute() {
            Ok(output) => {
                let mut lines = output.into_lines();
                if lines.last().is_some_and(|line| line == SUCCESS_SENTINEL) {
                    lines.pop();
                    (TestResult::Success, lines)
                } else {
                    (TestResult::ExecFailed, lines)
                }
            }
            Err(CommandError::Timeout { timeout, .. }) => (
                TestResult::ExecTimeout,
                vec![format!("Exceeded timeout! ({}s)", timeout.as_secs())],
            ),
            Err(error) => (TestResult::Error, error_lines(&error)),
        };

        debug!(
            qualified_name = test_run.qualified_name(),
            %result,
            elapsed = ?start.elapsed(),
            "ran test"
        );
        if let Err(error) = test_run.set_timed_result(result, output, start.snapshot()) {
            panic!("{error}");
        }
    }

    /// Removes anything staged for a test. Errors are logged and otherwise ignored.
    pub fn cleanup(&self, test_run: &TestRun) {
        if let Err(error) = self.environment.cleanup(test_run) {
            warn!(
                qualified_name = test_run.qualified_name(),
                "error cleaning up test: {}",
                DisplayErrorChain::new(&error)
            );
        }
    }

    /// Tears down the environment. Errors are logged and otherwise ignored.
    pub fn shutdown(&self) {
        if let Err(error) = self.environment.shutdown() {
            warn!(
                "error shutting down environment: {}",
                DisplayErrorChain::new(&error)
            );
        }
    }
}

/// Records a result, panicking if one was already recorded.
pub(crate) fn record(test_run: &TestRun, result: TestResult, output: Vec<String>) {
    if let Err(error) = test_run.set_result(result, output) {
        panic!("{error}");
    }
}

pub(crate) fn error_lines(error: &dyn Error) -> Vec<String> {
    DisplayErrorChain::new(error)
        .to_string()
        .lines()
        .map(str::to_owned)
        .collect()
}
