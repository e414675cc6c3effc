// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution environments: where compiled tests are staged and run.
//!
//! An [`Environment`] sets up target-wide state once, stages each compiled test into the place it
//! will run from, and tears both down afterwards. [`HostEnvironment`] stages into local
//! directories for a host JVM, and [`DeviceEnvironment`] pushes dexed jars to a device over `adb`.

mod adb;
mod device;
mod host;

pub use adb::*;
pub use device::*;
pub use host::*;

use crate::{classpath::Classpath, errors::EnvironmentError, test_run::TestRun};
use camino::{Utf8Path, Utf8PathBuf};

/// Where an environment staged a test, as seen by the process that will run it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedTest {
    classpath: Classpath,
    user_dir: Utf8PathBuf,
}

impl StagedTest {
    /// Creates a new staged test.
    pub fn new(classpath: Classpath, user_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            classpath,
            user_dir: user_dir.into(),
        }
    }

    /// Everything the test needs on its runtime classpath, apart from the harness.
    pub fn classpath(&self) -> &Classpath {
        &self.classpath
    }

    /// The working directory for the test process.
    pub fn user_dir(&self) -> &Utf8Path {
        &self.user_dir
    }
}

/// A request to stage a compiled test.
#[derive(Clone, Copy, Debug)]
pub struct StageRequest<'a> {
    /// The test being staged.
    pub test_run: &'a TestRun,

    /// The local directory holding the test's classes and `test.properties`.
    pub classes_dir: &'a Utf8Path,

    /// Additional classes the test needs at runtime.
    pub classpath: &'a Classpath,
}

/// A place tests are staged into and run from.
///
/// `prepare` is called once before anything is staged, `stage` concurrently from build workers,
/// and `cleanup` and `shutdown` from the single consumer.
pub trait Environment: Send + Sync {
    /// Sets up target-wide state and installs the compiled harness.
    ///
    /// Returns the harness classpath as seen by test processes.
    fn prepare(&self, harness_classes: &Utf8Path) -> Result<Classpath, EnvironmentError>;

    /// Stages a compiled test for execution.
    fn stage(&self, request: &StageRequest<'_>) -> Result<StagedTest, EnvironmentError>;

    /// Removes anything staged for a test. Safe to call even if staging failed.
    fn cleanup(&self, test_run: &TestRun) -> Result<(), EnvironmentError>;

    /// Removes target-wide state. Safe to call even if `prepare` failed.
    fn shutdown(&self) -> Result<(), EnvironmentError>;
}

/// Joins a device path with a file name, using `/` regardless of the host platform.
pub(crate) fn device_join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}
