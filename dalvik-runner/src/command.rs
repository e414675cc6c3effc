// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running external processes with merged output and an optional timeout.

use crate::errors::CommandError;
use camino::Utf8PathBuf;
use crossbeam_channel::RecvTimeoutError;
use duct::Handle;
use std::{
    fmt,
    io,
    process::{ExitStatus, Output},
    sync::Arc,
    time::Duration,
};
use tracing::debug;

/// An external command.
///
/// Standard output and standard error are merged and captured. By default a non-zero exit status
/// is reported as [`CommandError::Failed`].
#[derive(Clone, Debug)]
pub struct Command {
    program: String,
    args: Vec<String>,
    working_dir: Option<Utf8PathBuf>,
    timeout: Option<Duration>,
    permit_non_zero_exit: bool,
}

impl Command {
    /// Creates a new command for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            permit_non_zero_exit: false,
        }
    }

    /// Appends an argument.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory for the process.
    pub fn working_dir(&mut self, dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the wall-clock timeout. The process is killed if it runs for longer.
    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// If true, a non-zero exit status is not treated as an error.
    pub fn permit_non_zero_exit(&mut self, permit: bool) -> &mut Self {
        self.permit_non_zero_exit = permit;
        self
    }

    /// Returns the program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Runs the command to completion and returns its output.
    pub fn execute(&self) -> Result<CommandOutput, CommandError> {
        let command = self.to_string();
        debug!(%command, "executing");

        let mut expression = duct::cmd(self.program.as_str(), &self.args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked();
        if let Some(dir) = &self.working_dir {
            expression = expression.dir(dir.as_std_path());
        }

        let handle = expression
            .start()
            .map_err(|error| CommandError::Spawn {
                command: command.clone(),
                error,
            })?;

        let output = match self.timeout {
            Some(timeout) => wait_with_timeout(handle, timeout, &command)?,
            None => handle
                .wait()
                .cloned()
                .map_err(|error| CommandError::Wait {
                    command: command.clone(),
                    error,
                })?,
        };

        let lines = split_lines(&output.stdout);
        if !output.status.success() && !self.permit_non_zero_exit {
            return Err(CommandError::Failed {
                command,
                exit_code: output.status.code(),
                output: lines,
            });
        }

        Ok(CommandOutput {
            status: output.status,
            lines,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            shell_words::join(std::iter::once(&self.program).chain(&self.args))
        )
    }
}

/// The output of a command that ran to completion.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    status: ExitStatus,
    lines: Vec<String>,
}

impl CommandOutput {
    /// Returns the exit status.
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Returns the merged output, split into lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes self, returning the output lines.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

fn wait_with_timeout(
    handle: Handle,
    timeout: Duration,
    command: &str,
) -> Result<Output, CommandError> {
    let handle = Arc::new(handle);
    let (sender, receiver) = crossbeam_channel::bounded::<io::Result<Output>>(1);

    // The waiter is detached rather than scoped: if the process leaves behind children holding
    // the output pipe, waiting could block past the kill.
    let waiter = Arc::clone(&handle);
    std::thread::spawn(move || {
        let result = waiter.wait().cloned();
        // We don't care if the receiver got the message or not.
        let _ = sender.send(result);
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => result.map_err(|error| CommandError::Wait {
            command: command.to_owned(),
            error,
        }),
        Err(RecvTimeoutError::Timeout) => {
            debug!(%command, ?timeout, "timed out, killing process");
            if let Err(error) = handle.kill() {
                debug!(%command, %error, "error killing timed-out process");
            }
            Err(CommandError::Timeout {
                command: command.to_owned(),
                timeout,
            })
        }
        Err(RecvTimeoutError::Disconnected) => {
            unreachable!("waiting thread should never drop the sender without sending")
        }
    }
}

fn split_lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    #[test]
    fn captures_merged_output() {
        let output = Command::new("sh")
            .args(["-c", "echo out; echo err 1>&2; echo last"])
            .execute()
            .expect("command succeeds");
        assert_eq!(output.lines(), ["out", "err", "last"]);
        assert!(output.status().success());
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let err = Command::new("sh")
            .args(["-c", "echo diagnostics; exit 3"])
            .execute()
            .expect_err("non-zero exit fails");
        match err {
            CommandError::Failed {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(output, ["diagnostics"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_zero_exit_permitted() {
        let output = Command::new("sh")
            .args(["-c", "echo hi; exit 1"])
            .permit_non_zero_exit(true)
            .execute()
            .expect("non-zero exit is permitted");
        assert_eq!(output.status().code(), Some(1));
        assert_eq!(output.lines(), ["hi"]);
    }

    #[test]
    fn timeout_kills_process() {
        let start = Instant::now();
        let err = Command::new("sleep")
            .arg("30")
            .timeout(Some(Duration::from_millis(200)))
            .execute()
            .expect_err("command times out");
        assert!(
            matches!(err, CommandError::Timeout { .. }),
            "expected timeout, got {err}"
        );
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "returned promptly after the timeout"
        );
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = Command::new("/nonexistent/dalvik-runner-test-program")
            .execute()
            .expect_err("spawn fails");
        assert!(matches!(err, CommandError::Spawn { .. }), "got {err}");
    }

    #[test]
    fn display_escapes_arguments() {
        let mut command = Command::new("java");
        command.args(["-classpath", "a b.jar", "Main"]);
        assert_eq!(command.to_string(), "java -classpath 'a b.jar' Main");
    }
}
