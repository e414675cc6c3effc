// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by DalvikRunner.

use crate::test_run::TestResult;
use camino::{FromPathBufError, Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::{error::Error, fmt, io, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse dalvik-runner config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }
}

/// Error returned while parsing a [`TestResult`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized result kind: {input}\n(known values: {})",
    TestResult::variants().join(", "),
)]
pub struct TestResultParseError {
    input: String,
}

impl TestResultParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A result was recorded on a test run that already had one.
///
/// Results are terminal, so this always indicates a bug in the pipeline.
#[derive(Clone, Debug, Error)]
#[error("result for `{qualified_name}` already set to {existing} (attempted to set {attempted})")]
pub struct ResultAlreadySetError {
    qualified_name: String,
    existing: TestResult,
    attempted: TestResult,
}

impl ResultAlreadySetError {
    pub(crate) fn new(
        qualified_name: impl Into<String>,
        existing: TestResult,
        attempted: TestResult,
    ) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            existing,
            attempted,
        }
    }

    /// The result that was already recorded.
    pub fn existing(&self) -> TestResult {
        self.existing
    }

    /// The result that was rejected.
    pub fn attempted(&self) -> TestResult {
        self.attempted
    }
}

/// An error that occurred while loading an expectations file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExpectationParseError {
    /// The file exists but could not be read.
    #[error("error reading expectations file `{file}`")]
    Read {
        /// The expectations file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A line in the file was malformed.
    #[error("invalid expectation at {file}:{line_number}")]
    Line {
        /// The expectations file.
        file: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// What was wrong with the line.
        #[source]
        kind: ExpectationLineError,
    },
}

/// Describes a malformed line in an expectations file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExpectationLineError {
    /// The line was neither a `key value` pair nor a compact `name=result:KIND` record.
    #[error("unexpected line `{line}`")]
    UnexpectedLine {
        /// The contents of the line.
        line: String,
    },

    /// An unknown key was used.
    #[error("unexpected key `{key}` (expected one of: test, result, pattern)")]
    UnknownKey {
        /// The key.
        key: String,
    },

    /// A `result` or `pattern` line appeared before any `test` line.
    #[error("`{key}` appears before any `test` line")]
    NoCurrentTest {
        /// The key.
        key: String,
    },

    /// The result kind was not recognized.
    #[error(transparent)]
    UnknownResult(#[from] TestResultParseError),

    /// The output pattern is not a valid regular expression.
    #[error("invalid output pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        error: regex::Error,
    },
}

/// An error that occurred while running an external command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// The process could not be started.
    #[error("failed to start `{command}`")]
    Spawn {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An error occurred while waiting for the process.
    #[error("error waiting for `{command}`")]
    Wait {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The process exited with a non-zero status.
    #[error(
        "`{command}` exited with {}",
        .exit_code.map_or_else(|| "a signal".to_owned(), |code| format!("exit code {code}")),
    )]
    Failed {
        /// The command line.
        command: String,

        /// The exit code, or `None` if the process was terminated by a signal.
        exit_code: Option<i32>,

        /// Combined stdout and stderr, split into lines.
        output: Vec<String>,
    },

    /// The process exceeded its timeout and was killed.
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// The command line.
        command: String,

        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

/// An error that occurred while a code finder scanned an input path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FindError {
    /// An error occurred while walking a directory.
    #[error("error walking `{path}`")]
    Walk {
        /// The root of the walk.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path was not valid UTF-8.
    #[error("test path is not valid UTF-8")]
    NonUtf8Path(#[source] FromPathBufError),

    /// A source file could not be read.
    #[error("error reading `{path}`")]
    Read {
        /// The source file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while compiling Java sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The compiler ran and rejected the sources.
    #[error("compilation failed:\n{}", .output.join("\n"))]
    Diagnostics {
        /// The compiler's output.
        output: Vec<String>,
    },

    /// The compiler could not be invoked.
    #[error("error invoking compiler")]
    Invoke(#[source] CommandError),

    /// An error occurred while preparing compiler inputs or outputs.
    #[error("error operating on path `{path}`")]
    Fs {
        /// The path being operated on.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while preparing, staging into or tearing down an environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvironmentError {
    /// The staging directory for a test already exists.
    ///
    /// Reusing it would mix artifacts from a previous run into this one.
    #[error("staging directory `{path}` already exists")]
    AlreadyExists {
        /// The staging directory.
        path: Utf8PathBuf,
    },

    /// An error occurred while operating on the local file system.
    #[error("error operating on path `{path}`")]
    Fs {
        /// The path being operated on.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// An error occurred while copying a directory tree.
    #[error("error copying `{from}` to `{to}`")]
    Copy {
        /// The source directory.
        from: Utf8PathBuf,

        /// The destination directory.
        to: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: cp_r::Error,
    },

    /// A device bridge or tool command failed.
    #[error("environment command failed")]
    Command(#[from] CommandError),

    /// The device did not become ready in time.
    #[error("timed out after {}s waiting for `{path}` on the device to become non-empty", .timeout.as_secs())]
    DeviceTimeout {
        /// The device path being polled.
        path: String,

        /// The overall timeout.
        timeout: Duration,
    },
}

/// An error that occurred while preparing the shared harness. Fatal to the whole run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrepareError {
    /// A harness source file could not be written.
    #[error("error writing harness source `{path}`")]
    WriteSource {
        /// The source file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The harness failed to compile.
    #[error("failed to compile the test runner harness")]
    Compile(#[source] CompileError),

    /// The environment could not be prepared.
    #[error("failed to prepare the execution environment")]
    Environment(#[source] EnvironmentError),
}

/// An error that occurred while building or staging a single test.
///
/// These errors never escape the pipeline: they are recorded as the test's result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The test failed to compile.
    #[error("failed to compile test")]
    Compile(#[source] CompileError),

    /// The test descriptor could not be written.
    #[error("error writing test properties to `{path}`")]
    WriteProperties {
        /// The properties file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The environment failed to stage the test.
    #[error("failed to stage test")]
    Stage(#[source] EnvironmentError),
}

/// An error that occurred while writing a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] io::Error),

    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to {file}")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// A fatal error that stopped the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// Test discovery failed.
    #[error("failed to discover tests")]
    Find(#[from] FindError),

    /// The harness or environment could not be prepared.
    #[error("failed to prepare test run")]
    Prepare(#[from] PrepareError),

    /// The build worker pool could not be created.
    #[error("failed to create build worker pool")]
    ThreadPool(#[source] rayon::ThreadPoolBuildError),

    /// No built test arrived within the ready-queue timeout.
    ///
    /// This indicates a lost or hung build worker.
    #[error(
        "timed out after {}s waiting for a built test (expected {expected} tests, received {received})",
        .timeout.as_secs()
    )]
    ReadyQueueTimeout {
        /// The number of tests expected on the ready queue.
        expected: usize,

        /// The number of tests received so far.
        received: usize,

        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// All build workers exited before every test arrived.
    #[error("build workers exited early (expected {expected} tests, received {received})")]
    LostTests {
        /// The number of tests expected on the ready queue.
        expected: usize,

        /// The number of tests received.
        received: usize,
    },

    /// A reporter failed.
    #[error("error reporting test results")]
    Report(#[from] WriteEventError),
}

/// Displays an error along with its chain of causes.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut next = self.error.source();
        while let Some(err) = next {
            write!(f, "\n  caused by: {err}")?;
            next = err.source();
        }

        Ok(())
    }
}
