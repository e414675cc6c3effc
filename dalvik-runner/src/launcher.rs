// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building the command that runs a staged test.

use crate::{
    classpath::Classpath,
    command::Command,
    environment::{Adb, StagedTest},
    harness::TEST_RUNNER_CLASS,
    test_run::TestRun,
};

/// Everything a launcher needs to know about a staged test.
#[derive(Clone, Copy, Debug)]
pub struct LaunchRequest<'a> {
    /// The test to run.
    pub test_run: &'a TestRun,

    /// Where the test was staged.
    pub staged: &'a StagedTest,

    /// The harness classpath, as returned by the environment.
    pub harness_classpath: &'a Classpath,
}

impl LaunchRequest<'_> {
    /// The full runtime classpath: the staged test followed by the harness.
    pub fn runtime_classpath(&self) -> Classpath {
        let mut classpath = self.staged.classpath().clone();
        classpath.add_all(self.harness_classpath);
        classpath
    }
}

/// Builds the command that runs a staged test.
///
/// The command's exit status is not significant: the test process reports success through its
/// last line of output.
pub trait Launcher: Send + Sync {
    /// Returns the command for the given test.
    fn command(&self, request: &LaunchRequest<'_>) -> Command;
}

/// Runs tests on a host JVM.
#[derive(Clone, Debug)]
pub struct JvmLauncher {
    base: Command,
    debug_port: Option<u16>,
}

impl JvmLauncher {
    /// Creates a launcher invoking the given `java` program.
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Creates a launcher from a base command that further arguments are appended to.
    pub fn from_command(base: Command) -> Self {
        Self {
            base,
            debug_port: None,
        }
    }

    /// Suspends the VM on startup and waits for a debugger on the given port.
    pub fn debug_port(mut self, port: Option<u16>) -> Self {
        self.debug_port = port;
        self
    }
}

impl Launcher for JvmLauncher {
    fn command(&self, request: &LaunchRequest<'_>) -> Command {
        let user_dir = request.staged.user_dir();
        let mut command = self.base.clone();
        if let Some(port) = self.debug_port {
            command.arg(format!(
                "-agentlib:jdwp=transport=dt_socket,address={port},server=y,suspend=y"
            ));
        }
        command
            .arg("-classpath")
            .arg(request.runtime_classpath().to_string())
            .arg(format!("-Duser.dir={user_dir}"))
            .arg(TEST_RUNNER_CLASS)
            .working_dir(user_dir);
        command
    }
}

/// Runs tests in a Dalvik VM on a device.
#[derive(Clone, Debug)]
pub struct DalvikLauncher {
    adb: Adb,
    debug_port: Option<u16>,
}

impl DalvikLauncher {
    /// Creates a launcher running `dalvikvm` through the given device bridge.
    pub fn new(adb: Adb) -> Self {
        Self {
            adb,
            debug_port: None,
        }
    }

    /// Suspends the VM on startup and waits for a debugger on the given port.
    pub fn debug_port(mut self, port: Option<u16>) -> Self {
        self.debug_port = port;
        self
    }
}

impl Launcher for DalvikLauncher {
    fn command(&self, request: &LaunchRequest<'_>) -> Command {
        // Device paths always use `:` regardless of the host platform.
        let classpath = request
            .runtime_classpath()
            .iter()
            .map(|entry| entry.as_str())
            .collect::<Vec<_>>()
            .join(":");

        let mut command = self.adb.shell(["dalvikvm"]);
        command
            .arg("-classpath")
            .arg(classpath)
            .arg(format!("-Duser.dir={}", request.staged.user_dir()));
        if let Some(port) = self.debug_port {
            command.arg(format!(
                "-Xrunjdwp:transport=dt_socket,address={port},server=y,suspend=y"
            ));
        }
        command.arg(TEST_RUNNER_CLASS);
        command
    }
}
