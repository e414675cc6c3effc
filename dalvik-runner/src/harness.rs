// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Java harness compiled once per run and placed on every test's classpath.
//!
//! The harness consists of a fixed entry point, `dalvik.runner.TestRunner`, plus one runner class
//! per [`RunnerKind`]. Each test process reads a `test.properties` resource to find out which test
//! class to run and which runner to use, then prints [`SUCCESS_SENTINEL`] as its last line if the
//! test passed.

use crate::{
    errors::PrepareError,
    test_run::{RunnerKind, TestRun},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeSet, fs, io};
use swrite::{SWrite, swrite, swriteln};

/// The Java package containing the harness classes.
pub const HARNESS_PACKAGE: &str = "dalvik.runner";

/// The entry point class for every test process.
pub const TEST_RUNNER_CLASS: &str = "dalvik.runner.TestRunner";

/// The line a test process prints last if and only if the test passed.
pub const SUCCESS_SENTINEL: &str = "DalvikRunner: test passed";

/// The name of the per-test descriptor read by the test process.
pub const PROPERTIES_FILE_NAME: &str = "test.properties";

/// A harness source file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HarnessSource {
    /// The file name, e.g. `TestRunner.java`.
    pub file_name: &'static str,

    /// The Java source.
    pub contents: &'static str,
}

const TEST_RUNNER: HarnessSource = HarnessSource {
    file_name: "TestRunner.java",
    contents: include_str!("../harness/TestRunner.java"),
};

/// Returns the harness source for a runner kind.
pub fn runner_source(kind: RunnerKind) -> HarnessSource {
    match kind {
        RunnerKind::Jtreg => HarnessSource {
            file_name: "JtregRunner.java",
            contents: include_str!("../harness/JtregRunner.java"),
        },
        RunnerKind::JUnit => HarnessSource {
            file_name: "JUnitRunner.java",
            contents: include_str!("../harness/JUnitRunner.java"),
        },
        RunnerKind::Caliper => HarnessSource {
            file_name: "CaliperRunner.java",
            contents: include_str!("../harness/CaliperRunner.java"),
        },
        RunnerKind::Main => HarnessSource {
            file_name: "MainRunner.java",
            contents: include_str!("../harness/MainRunner.java"),
        },
    }
}

/// Returns the fixed entry point followed by the sources for each given runner kind.
///
/// Each kind appears at most once, in a stable order.
pub fn harness_sources(kinds: impl IntoIterator<Item = RunnerKind>) -> Vec<HarnessSource> {
    let kinds: BTreeSet<_> = kinds.into_iter().collect();
    std::iter::once(TEST_RUNNER)
        .chain(kinds.into_iter().map(runner_source))
        .collect()
}

/// Writes the harness sources into `dir`, laid out by package, and returns the written paths.
pub fn write_harness_sources(
    dir: &Utf8Path,
    kinds: impl IntoIterator<Item = RunnerKind>,
) -> Result<Vec<Utf8PathBuf>, PrepareError> {
    let package_dir = dir.join(HARNESS_PACKAGE.replace('.', "/"));
    fs::create_dir_all(&package_dir).map_err(|error| PrepareError::WriteSource {
        path: package_dir.clone(),
        error,
    })?;

    harness_sources(kinds)
        .into_iter()
        .map(|source| {
            let path = package_dir.join(source.file_name);
            match fs::write(&path, source.contents) {
                Ok(()) => Ok(path),
                Err(error) => Err(PrepareError::WriteSource { path, error }),
            }
        })
        .collect()
}

/// The per-test descriptor handed to the test process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestProperties<'a> {
    /// The class to run.
    pub test_class: &'a str,

    /// The test's qualified name.
    pub qualified_name: &'a str,

    /// The fully qualified runner class.
    pub runner_class: String,
}

impl<'a> TestProperties<'a> {
    /// Creates the descriptor for a test run.
    pub fn for_run(test_run: &'a TestRun) -> Self {
        Self {
            test_class: test_run.test_class(),
            qualified_name: test_run.qualified_name(),
            runner_class: test_run.runner().runner_class(),
        }
    }

    /// Serializes to the Java properties format.
    pub fn to_properties_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in [
            ("testClass", self.test_class),
            ("qualifiedName", self.qualified_name),
            ("runnerClass", self.runner_class.as_str()),
        ] {
            swriteln!(out, "{key}={}", escape_value(value));
        }
        out
    }

    /// Writes `test.properties` into `dir`, returning its path.
    pub fn write(&self, dir: &Utf8Path) -> io::Result<Utf8PathBuf> {
        let path = dir.join(PROPERTIES_FILE_NAME);
        fs::write(&path, self.to_properties_string())?;
        Ok(path)
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (idx, c) in value.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if idx == 0 => out.push_str("\\ "),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    swrite!(out, "\\u{unit:04X}");
                }
            }
        }
    }
    out
}
