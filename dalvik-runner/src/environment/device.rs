// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Adb, Environment, StageRequest, StagedTest, device_join};
use crate::{
    classpath::Classpath,
    command::Command,
    config::DeviceConfig,
    errors::{CommandError, EnvironmentError},
    harness::PROPERTIES_FILE_NAME,
    test_run::TestRun,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs, time::Duration};
use tracing::{debug, info};

/// Converts class directories and jars into a dex jar with `dx`.
#[derive(Clone, Debug)]
pub struct Dx {
    base: Command,
}

impl Dx {
    /// Creates a wrapper invoking the given `dx` program.
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Creates a wrapper from a base command that `dx` arguments are appended to.
    pub fn from_command(base: Command) -> Self {
        Self { base }
    }

    /// Dexes the given inputs into `output`.
    pub fn dex<'a>(
        &self,
        output: &Utf8Path,
        inputs: impl IntoIterator<Item = &'a Utf8Path>,
    ) -> Result<(), CommandError> {
        let mut command = self.base.clone();
        command
            .arg("--dex")
            .arg(format!("--output={output}"))
            .args(inputs.into_iter().map(Utf8Path::as_str));
        command.execute()?;
        Ok(())
    }
}

/// Updates jars with the `jar` tool.
#[derive(Clone, Debug)]
pub struct JarTool {
    base: Command,
}

impl JarTool {
    /// Creates a wrapper invoking the given `jar` program.
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Creates a wrapper from a base command that `jar` arguments are appended to.
    pub fn from_command(base: Command) -> Self {
        Self { base }
    }

    /// Adds `file`, relative to `dir`, to an existing jar.
    pub fn add_file(&self, jar: &Utf8Path, dir: &Utf8Path, file: &str) -> Result<(), CommandError> {
        let mut command = self.base.clone();
        command.args(["uf", jar.as_str(), "-C", dir.as_str(), file]);
        command.execute()?;
        Ok(())
    }
}

/// Options for [`DeviceEnvironment`].
#[derive(Clone, Debug)]
pub struct DeviceOptions {
    /// The working directory on the device.
    pub runner_dir: String,

    /// How long to wait for the device's storage to become available.
    pub device_wait_timeout: Duration,

    /// How often to check whether the device's storage is available.
    pub poll_interval: Duration,

    /// Whether to remove the device working directory before the run.
    pub clean_before: bool,

    /// Whether to remove test files from the device after they run.
    pub clean_after: bool,

    /// A port to forward to the device for debugging.
    pub debug_port: Option<u16>,
}

impl DeviceOptions {
    /// Creates options from the device config.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            runner_dir: config.runner_dir.clone(),
            device_wait_timeout: config.device_wait_timeout,
            poll_interval: config.poll_interval,
            clean_before: config.clean_before,
            clean_after: config.clean_after,
            debug_port: None,
        }
    }
}

/// Stages tests onto a device over `adb`.
///
/// Compiled classes are dexed into a jar locally, then pushed to
/// `<runner_dir>/<qualified-name>/<qualified-name>.jar`.
#[derive(Clone, Debug)]
pub struct DeviceEnvironment {
    adb: Adb,
    dx: Dx,
    jar: JarTool,
    local_dir: Utf8PathBuf,
    options: DeviceOptions,
}

impl DeviceEnvironment {
    /// Creates a new device environment. Dexed jars are written to `local_dir` before being pushed.
    pub fn new(
        adb: Adb,
        dx: Dx,
        jar: JarTool,
        local_dir: impl Into<Utf8PathBuf>,
        options: DeviceOptions,
    ) -> Self {
        Self {
            adb,
            dx,
            jar,
            local_dir: local_dir.into(),
            options,
        }
    }

    /// Returns the device bridge.
    pub fn adb(&self) -> &Adb {
        &self.adb
    }

    /// Returns the device directory a test is staged into.
    pub fn test_dir(&self, test_run: &TestRun) -> String {
        device_join(&self.options.runner_dir, test_run.qualified_name())
    }

    fn runner_dir_parent(&self) -> &str {
        let dir = self.options.runner_dir.trim_end_matches('/');
        match dir.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &dir[..idx],
        }
    }

    fn create_local_dir(&self) -> Result<(), EnvironmentError> {
        fs::create_dir_all(&self.local_dir).map_err(|error| EnvironmentError::Fs {
            path: self.local_dir.clone(),
            error,
        })
    }
}

impl Environment for DeviceEnvironment {
    fn prepare(&self, harness_classes: &Utf8Path) -> Result<Classpath, EnvironmentError> {
        let runner_dir = &self.options.runner_dir;

        info!("waiting for device");
        self.adb.wait_for_device()?;
        self.adb.wait_for_non_empty_dir(
            self.runner_dir_parent(),
            self.options.device_wait_timeout,
            self.options.poll_interval,
        )?;

        if self.options.clean_before {
            debug!(%runner_dir, "removing previous device directory");
            self.adb.rm(runner_dir)?;
        }
        self.adb.mkdir(runner_dir)?;

        self.create_local_dir()?;
        let local_jar = self.local_dir.join("harness.jar");
        self.dx.dex(&local_jar, [harness_classes])?;

        let device_jar = device_join(runner_dir, "harness.jar");
        self.adb.push(&local_jar, &device_jar)?;

        if let Some(port) = self.options.debug_port {
            self.adb.forward_tcp(port)?;
        }

        Ok(Classpath::of([device_jar]))
    }

    fn stage(&self, request: &StageRequest<'_>) -> Result<StagedTest, EnvironmentError> {
        let qualified_name = request.test_run.qualified_name();
        let jar_name = format!("{qualified_name}.jar");

        let local_jar = self.local_dir.join(&jar_name);
        let inputs = std::iter::once(request.classes_dir).chain(request.classpath.iter());
        self.dx.dex(&local_jar, inputs)?;
        self.jar
            .add_file(&local_jar, request.classes_dir, PROPERTIES_FILE_NAME)?;

        let test_dir = self.test_dir(request.test_run);
        let device_jar = device_join(&test_dir, &jar_name);
        self.adb.mkdir(&test_dir)?;
        self.adb.push(&local_jar, &device_jar)?;
        debug!(%qualified_name, %device_jar, "pushed test");

        Ok(StagedTest::new(Classpath::of([device_jar]), test_dir))
    }

    fn cleanup(&self, test_run: &TestRun) -> Result<(), EnvironmentError> {
        if self.options.clean_after {
            self.adb.rm(&self.test_dir(test_run))?;
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), EnvironmentError> {
        if self.options.clean_after {
            self.adb.rm(&self.options.runner_dir)?;
        }
        Ok(())
    }
}
