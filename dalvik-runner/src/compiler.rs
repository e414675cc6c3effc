// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compiling Java sources into class directories.

use crate::{
    classpath::Classpath,
    command::Command,
    errors::{CommandError, CompileError},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// A single compilation.
#[derive(Clone, Debug)]
pub struct CompileRequest<'a> {
    /// The source files to compile.
    pub sources: &'a [Utf8PathBuf],

    /// Classes the sources are compiled against.
    pub classpath: &'a Classpath,

    /// Where to look for other sources referenced by `sources`.
    pub source_path: Option<&'a Utf8Path>,

    /// The directory to write classes into. Created if it doesn't exist.
    pub output_dir: &'a Utf8Path,
}

/// Compiles Java sources.
///
/// Implementations are called concurrently from build workers, each with its own output
/// directory.
pub trait Compiler: Send + Sync {
    /// Compiles the request's sources into its output directory.
    ///
    /// Returns [`CompileError::Diagnostics`] if the compiler rejected the sources.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<(), CompileError>;
}

/// Compiles sources with `javac`.
#[derive(Clone, Debug)]
pub struct Javac {
    base: Command,
    boot_classpath: Option<Utf8PathBuf>,
}

impl Javac {
    /// Creates a compiler invoking the given `javac` program.
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_command(Command::new(program))
    }

    /// Creates a compiler from a base command that further arguments are appended to.
    pub fn from_command(base: Command) -> Self {
        Self {
            base,
            boot_classpath: None,
        }
    }

    /// Compiles against the given jar instead of the JDK's own classes.
    pub fn boot_classpath(mut self, jar: impl Into<Utf8PathBuf>) -> Self {
        self.boot_classpath = Some(jar.into());
        self
    }

    fn command(&self, request: &CompileRequest<'_>) -> Command {
        let mut command = self.base.clone();
        command.args(["-g", "-encoding", "UTF-8", "-d", request.output_dir.as_str()]);
        if let Some(jar) = &self.boot_classpath {
            command.args(["-bootclasspath", jar.as_str()]);
        }
        if !request.classpath.is_empty() {
            command.arg("-classpath").arg(request.classpath.to_string());
        }
        if let Some(source_path) = request.source_path {
            command.args(["-sourcepath", source_path.as_str()]);
        }
        command.args(request.sources.iter().map(|source| source.as_str()));
        command
    }
}

impl Compiler for Javac {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<(), CompileError> {
        fs::create_dir_all(request.output_dir).map_err(|error| CompileError::Fs {
            path: request.output_dir.to_owned(),
            error,
        })?;

        match self.command(request).execute() {
            Ok(_) => Ok(()),
            Err(CommandError::Failed { output, .. }) => Err(CompileError::Diagnostics { output }),
            Err(error) => Err(CompileError::Invoke(error)),
        }
    }
}
