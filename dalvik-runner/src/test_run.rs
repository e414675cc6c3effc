// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The record tracking a single discovered test through the pipeline.

use crate::{
    classpath::Classpath,
    environment::StagedTest,
    errors::{ResultAlreadySetError, TestResultParseError},
    expectations::ExpectedResult,
    time::StopwatchSnapshot,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::{
    fmt,
    str::FromStr,
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// The terminal result of a test run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestResult {
    /// The test ran and reported success through the sentinel protocol.
    Success,

    /// The test ran to completion but did not report success.
    ExecFailed,

    /// The test exceeded the configured timeout and was killed.
    ExecTimeout,

    /// The test's sources failed to compile.
    CompileFailed,

    /// An unexpected error occurred while building, staging or running the test.
    Error,

    /// The expectation table declares that this test cannot run in this configuration.
    Unsupported,
}

impl TestResult {
    /// Returns the string representations of all known results.
    pub fn variants() -> [&'static str; 6] {
        [
            "SUCCESS",
            "EXEC_FAILED",
            "EXEC_TIMEOUT",
            "COMPILE_FAILED",
            "ERROR",
            "UNSUPPORTED",
        ]
    }

    /// Returns the string representation of this result.
    pub fn as_str(self) -> &'static str {
        match self {
            TestResult::Success => "SUCCESS",
            TestResult::ExecFailed => "EXEC_FAILED",
            TestResult::ExecTimeout => "EXEC_TIMEOUT",
            TestResult::CompileFailed => "COMPILE_FAILED",
            TestResult::Error => "ERROR",
            TestResult::Unsupported => "UNSUPPORTED",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = TestResultParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s {
            "SUCCESS" => TestResult::Success,
            "EXEC_FAILED" => TestResult::ExecFailed,
            "EXEC_TIMEOUT" => TestResult::ExecTimeout,
            "COMPILE_FAILED" => TestResult::CompileFailed,
            "ERROR" => TestResult::Error,
            "UNSUPPORTED" => TestResult::Unsupported,
            other => return Err(TestResultParseError::new(other)),
        };
        Ok(val)
    }
}

/// The kind of harness runner needed to execute a test.
///
/// Each kind corresponds to one harness source file, which is only compiled if at least one
/// discovered test needs it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum RunnerKind {
    /// A jtreg test: a class with a `main` method and `@test` tags.
    Jtreg,

    /// A JUnit 3 style test case.
    JUnit,

    /// A Caliper benchmark.
    Caliper,

    /// A plain class with a `main` method.
    Main,
}

impl RunnerKind {
    /// All runner kinds.
    pub const ALL: [RunnerKind; 4] = [
        RunnerKind::Jtreg,
        RunnerKind::JUnit,
        RunnerKind::Caliper,
        RunnerKind::Main,
    ];

    /// Returns the simple class name of the harness runner.
    pub fn class_simple_name(self) -> &'static str {
        match self {
            RunnerKind::Jtreg => "JtregRunner",
            RunnerKind::JUnit => "JUnitRunner",
            RunnerKind::Caliper => "CaliperRunner",
            RunnerKind::Main => "MainRunner",
        }
    }

    /// Returns the fully qualified class name of the harness runner.
    pub fn runner_class(self) -> String {
        format!(
            "{}.{}",
            crate::harness::HARNESS_PACKAGE,
            self.class_simple_name()
        )
    }

    /// Returns the file name of the harness runner source.
    pub fn source_file_name(self) -> String {
        format!("{}.java", self.class_simple_name())
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Jtreg => f.write_str("jtreg"),
            RunnerKind::JUnit => f.write_str("junit"),
            RunnerKind::Caliper => f.write_str("caliper"),
            RunnerKind::Main => f.write_str("main"),
        }
    }
}

/// The final outcome of a test run: its result and captured output.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    result: TestResult,
    output: Vec<String>,
    timing: Option<StopwatchSnapshot>,
}

impl TestOutcome {
    /// Returns the terminal result.
    pub fn result(&self) -> TestResult {
        self.result
    }

    /// Returns the captured output lines.
    ///
    /// For successful runs the success sentinel line is not included.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Returns the time at which execution started, if the test was executed.
    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.timing.as_ref().map(|timing| timing.start_time)
    }

    /// Returns how long execution took, or zero if the test was never executed.
    pub fn time_taken(&self) -> Duration {
        self.timing
            .as_ref()
            .map_or(Duration::ZERO, |timing| timing.duration)
    }
}

/// Describes a test as produced by a code finder, before it enters the pipeline.
#[derive(Clone, Debug)]
pub struct TestRunSpec {
    /// The globally unique name of this test.
    pub qualified_name: String,

    /// The suite (typically the Java package) this test belongs to.
    pub suite_name: String,

    /// The short name of this test within its suite.
    pub test_name: String,

    /// A human-readable description, if the test provides one.
    pub description: Option<String>,

    /// The directory containing the test's sources; used as the source path when compiling.
    pub test_directory: Utf8PathBuf,

    /// The test's source file.
    pub test_java: Utf8PathBuf,

    /// The class to execute.
    pub test_class: String,

    /// The harness runner needed to execute this test.
    pub runner: RunnerKind,

    /// Additional classpath entries needed by the runner.
    pub runner_classpath: Classpath,
}

/// A single discovered test, along with its build and execution state.
///
/// A `TestRun` is shared between the build workers and the serialized consumer, so its mutable
/// state uses interior mutability. Each piece of state is written at most once.
#[derive(Debug)]
pub struct TestRun {
    spec: TestRunSpec,
    expected: OnceLock<ExpectedResult>,
    compiled: AtomicBool,
    staged: OnceLock<StagedTest>,
    outcome: OnceLock<TestOutcome>,
}

impl TestRun {
    /// Creates a new test run.
    pub fn new(spec: TestRunSpec) -> Self {
        Self {
            spec,
            expected: OnceLock::new(),
            compiled: AtomicBool::new(false),
            staged: OnceLock::new(),
            outcome: OnceLock::new(),
        }
    }

    /// Returns the qualified name, the sole identity of this test.
    pub fn qualified_name(&self) -> &str {
        &self.spec.qualified_name
    }

    /// Returns the suite name.
    pub fn suite_name(&self) -> &str {
        &self.spec.suite_name
    }

    /// Returns the short test name.
    pub fn test_name(&self) -> &str {
        &self.spec.test_name
    }

    /// Returns the description, if any.
    pub fn description(&self) -> Option<&str> {
        self.spec.description.as_deref()
    }

    /// Returns the directory containing the test's sources.
    pub fn test_directory(&self) -> &Utf8Path {
        &self.spec.test_directory
    }

    /// Returns the test's source file.
    pub fn test_java(&self) -> &Utf8Path {
        &self.spec.test_java
    }

    /// Returns the class to execute.
    pub fn test_class(&self) -> &str {
        &self.spec.test_class
    }

    /// Returns the harness runner kind.
    pub fn runner(&self) -> RunnerKind {
        self.spec.runner
    }

    /// Returns the classpath needed by the runner.
    pub fn runner_classpath(&self) -> &Classpath {
        &self.spec.runner_classpath
    }

    /// Attaches the expected result. Only the first call has an effect.
    pub fn set_expected(&self, expected: ExpectedResult) {
        let _ = self.expected.set(expected);
    }

    /// Returns the expected result, or the default expectation if none was attached.
    pub fn expected(&self) -> &ExpectedResult {
        self.expected
            .get()
            .unwrap_or_else(ExpectedResult::default_ref)
    }

    /// Records that the test's sources compiled and were staged.
    pub(crate) fn set_compiled(&self, staged: StagedTest) {
        let _ = self.staged.set(staged);
        self.compiled.store(true, Ordering::Release);
    }

    /// Returns true if the test's sources compiled successfully.
    pub fn is_compiled(&self) -> bool {
        self.compiled.load(Ordering::Acquire)
    }

    /// Returns where the environment staged this test, if it was staged.
    pub fn staged(&self) -> Option<&StagedTest> {
        self.staged.get()
    }

    /// Records the terminal result of this test along with its output.
    ///
    /// Returns an error if a result was already recorded.
    pub fn set_result(
        &self,
        result: TestResult,
        output: Vec<String>,
    ) -> Result<(), ResultAlreadySetError> {
        self.set_outcome(TestOutcome {
            result,
            output,
            timing: None,
        })
    }

    pub(crate) fn set_timed_result(
        &self,
        result: TestResult,
        output: Vec<String>,
        timing: StopwatchSnapshot,
    ) -> Result<(), ResultAlreadySetError> {
        self.set_outcome(TestOutcome {
            result,
            output,
            timing: Some(timing),
        })
    }

    fn set_outcome(&self, outcome: TestOutcome) -> Result<(), ResultAlreadySetError> {
        let attempted = outcome.result;
        self.outcome.set(outcome).map_err(|_| {
            let existing = self
                .outcome
                .get()
                .map_or(attempted, |existing| existing.result);
            ResultAlreadySetError::new(self.qualified_name(), existing, attempted)
        })
    }

    /// Returns the outcome, if a result was recorded.
    pub fn outcome(&self) -> Option<&TestOutcome> {
        self.outcome.get()
    }

    /// Returns the result, if one was recorded.
    pub fn result(&self) -> Option<TestResult> {
        self.outcome.get().map(|outcome| outcome.result)
    }

    /// Returns true if the test compiled successfully and no result has been recorded yet.
    pub fn is_runnable(&self) -> bool {
        self.is_compiled() && self.outcome.get().is_none()
    }

    /// Returns true if the recorded outcome matches the expected result.
    ///
    /// Returns false if no result has been recorded.
    pub fn matches_expectation(&self) -> bool {
        self.outcome
            .get()
            .is_some_and(|outcome| self.expected().matches(outcome))
    }
}
