// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    command::Command,
    errors::{CommandError, EnvironmentError},
};
use camino::Utf8Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// A thin wrapper around the Android debug bridge.
#[derive(Clone, Debug)]
pub struct Adb {
    base: Command,
}

impl Adb {
    /// Creates a wrapper invoking the given `adb` program.
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Creates a wrapper from a base command that `adb` arguments are appended to.
    pub fn from_command(base: Command) -> Self {
        Self { base }
    }

    /// Returns a command running `adb` with the given arguments.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = self.base.clone();
        command.args(args);
        command
    }

    /// Returns a command running a shell command on the device.
    pub fn shell<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = self.command(["shell"]);
        command.args(args);
        command
    }

    /// Blocks until a device is attached.
    pub fn wait_for_device(&self) -> Result<(), CommandError> {
        self.command(["wait-for-device"]).execute()?;
        Ok(())
    }

    /// Creates a directory on the device, along with any missing parents.
    pub fn mkdir(&self, dir: &str) -> Result<(), CommandError> {
        self.shell(["mkdir", "-p", dir]).execute()?;
        Ok(())
    }

    /// Recursively removes a path on the device.
    ///
    /// A path that doesn't exist is not an error.
    pub fn rm(&self, path: &str) -> Result<(), CommandError> {
        self.shell(["rm", "-r", path])
            .permit_non_zero_exit(true)
            .execute()?;
        Ok(())
    }

    /// Copies a local file to the device.
    pub fn push(&self, local: &Utf8Path, remote: &str) -> Result<(), CommandError> {
        self.command(["push", local.as_str(), remote]).execute()?;
        Ok(())
    }

    /// Lists a directory on the device.
    ///
    /// Returns an empty list if the directory doesn't exist.
    pub fn ls(&self, path: &str) -> Result<Vec<String>, CommandError> {
        // Older versions of adb don't propagate the shell's exit status.
        let output = self
            .shell(["ls", path])
            .permit_non_zero_exit(true)
            .execute()?;
        if output
            .lines()
            .iter()
            .any(|line| line.contains("No such file or directory"))
        {
            return Ok(Vec::new());
        }
        Ok(output
            .into_lines()
            .into_iter()
            .map(|line| line.trim().to_owned())
            .filter(|line| !line.is_empty())
            .collect())
    }

    /// Forwards a local TCP port to the same port on the device.
    pub fn forward_tcp(&self, port: u16) -> Result<(), CommandError> {
        let spec = format!("tcp:{port}");
        self.command(["forward", spec.as_str(), spec.as_str()])
            .execute()?;
        Ok(())
    }

    /// Polls a directory on the device until it is non-empty.
    ///
    /// Freshly booted devices may take a while to mount their storage.
    pub fn wait_for_non_empty_dir(
        &self,
        path: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), EnvironmentError> {
        let start = Instant::now();
        loop {
            if !self.ls(path)?.is_empty() {
                debug!(%path, elapsed = ?start.elapsed(), "device directory is ready");
                return Ok(());
            }
            if start.elapsed() + poll_interval > timeout {
                return Err(EnvironmentError::DeviceTimeout {
                    path: path.to_owned(),
                    timeout,
                });
            }
            debug!(%path, "device directory is empty, retrying");
            std::thread::sleep(poll_interval);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::helpers::test_helpers::write_script;
    use camino_tempfile::Utf8TempDir;
    use indoc::formatdoc;
    use pretty_assertions::assert_eq;

    fn fake_adb(dir: &Utf8Path, body: &str) -> Adb {
        let script = write_script(dir, "adb", body);
        let mut base = Command::new("sh");
        base.arg(script.as_str());
        Adb::from_command(base)
    }

    #[test]
    fn commands_append_arguments() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let log = dir.path().join("log");
        let adb = fake_adb(dir.path(), &format!("echo \"$@\" >> {log}"));

        adb.wait_for_device().unwrap();
        adb.mkdir("/sdcard/dalvikrunner/a.B").unwrap();
        adb.push(Utf8Path::new("/tmp/a.B.jar"), "/sdcard/dalvikrunner/a.B")
            .unwrap();
        adb.forward_tcp(8000).unwrap();
        adb.rm("/sdcard/dalvikrunner").unwrap();

        let log = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            log.lines().collect::<Vec<_>>(),
            [
                "wait-for-device",
                "shell mkdir -p /sdcard/dalvikrunner/a.B",
                "push /tmp/a.B.jar /sdcard/dalvikrunner/a.B",
                "forward tcp:8000 tcp:8000",
                "shell rm -r /sdcard/dalvikrunner",
            ]
        );
    }

    #[test]
    fn ls_missing_directory_is_empty() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let adb = fake_adb(
            dir.path(),
            "echo \"ls: $3: No such file or directory\"; exit 1",
        );
        assert_eq!(adb.ls("/sdcard").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn wait_for_non_empty_dir_polls() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let counter = dir.path().join("counter");
        // Empty on the first two calls, then populated.
        let adb = fake_adb(
            dir.path(),
            &formatdoc! {"
                echo x >> {counter}
                if [ $(wc -l < {counter}) -ge 3 ]; then
                    echo dalvikrunner
                    echo DCIM
                fi
            "},
        );

        adb.wait_for_non_empty_dir("/sdcard", Duration::from_secs(30), Duration::from_millis(10))
            .expect("directory becomes non-empty");
        let calls = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(calls, 3);
    }

    #[test]
    fn wait_for_non_empty_dir_times_out() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let adb = fake_adb(dir.path(), "true");
        let err = adb
            .wait_for_non_empty_dir(
                "/sdcard",
                Duration::from_millis(100),
                Duration::from_millis(20),
            )
            .expect_err("directory never becomes non-empty");
        assert!(
            matches!(err, EnvironmentError::DeviceTimeout { .. }),
            "got {err}"
        );
    }
}
