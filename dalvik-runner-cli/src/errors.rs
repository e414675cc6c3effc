// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::FromPathBufError;
use dalvik_runner::errors::{ConfigParseError, DriverError, ExpectationParseError};
use owo_colors::OwoColorize;
use std::{error::Error, io};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for `dalvikrunner` failures.
///
/// `dalvikrunner` may also exit with 2 on usage errors, and 101 on a panic.
pub enum DalvikRunnerExitCode {}

impl DalvikRunnerExitCode {
    /// The run completed. Unexpected results don't change the exit code unless
    /// `--fail-on-unexpected` is passed.
    pub const OK: i32 = 0;

    /// The run could not start or could not continue: an invalid config or expectations file, a
    /// harness that failed to build, an unreachable device, or a lost build.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests didn't match their expectation, and `--fail-on-unexpected` was passed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Writing test results to the terminal or to the JUnit report failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    GetCurrentDirFailed {
        #[source]
        err: io::Error,
    },
    #[error("current directory is invalid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("expectations parse error")]
    ExpectationParseError {
        #[from]
        err: ExpectationParseError,
    },
    #[error("error creating temporary directory")]
    TempDirCreateError {
        #[source]
        err: io::Error,
    },
    #[error("test run error")]
    DriverError {
        #[from]
        err: DriverError,
    },
    #[error("test run failed")]
    TestRunFailed { unexpected: usize },
}

impl ExpectedError {
    pub(crate) fn test_run_failed(unexpected: usize) -> Self {
        Self::TestRunFailed { unexpected }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::GetCurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ExpectationParseError { .. }
            | Self::TempDirCreateError { .. } => DalvikRunnerExitCode::SETUP_ERROR,
            Self::DriverError { err } => match err {
                DriverError::Report(_) => DalvikRunnerExitCode::WRITE_OUTPUT_ERROR,
                _ => DalvikRunnerExitCode::SETUP_ERROR,
            },
            Self::TestRunFailed { .. } => DalvikRunnerExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::GetCurrentDirFailed { err } => {
                error!("could not determine current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!(
                    "current directory `{}` is invalid UTF-8",
                    err.as_path().display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::ExpectationParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TempDirCreateError { err } => {
                error!("error creating temporary directory for the run");
                Some(err as &dyn Error)
            }
            Self::DriverError { err } => {
                match err {
                    DriverError::ReadyQueueTimeout { .. } => {
                        error!("{err}");
                        error!(
                            target: NO_HEADING_TARGET,
                            "(hint: raise `run.ready-timeout` in the config if builds are slow)"
                        );
                    }
                    _ => error!("{err}"),
                }
                err.source()
            }
            Self::TestRunFailed { unexpected } => {
                error!(
                    "test run failed: {} {} did not match {}",
                    unexpected.style(styles.bold),
                    if *unexpected == 1 { "test" } else { "tests" },
                    if *unexpected == 1 {
                        "its expectation"
                    } else {
                        "their expectations"
                    },
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
