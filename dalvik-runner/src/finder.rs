// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovering tests from input paths.
//!
//! A [`CodeFinder`] turns a file or directory into a list of tests. Finders are consulted in
//! priority order for each input path, and the first one to find anything claims that path.

use crate::{
    classpath::Classpath,
    config::RunnersConfig,
    errors::FindError,
    test_run::{RunnerKind, TestRun, TestRunSpec},
};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::{collections::HashSet, fs, sync::LazyLock};
use tracing::debug;
use walkdir::WalkDir;

/// Discovers tests under an input path.
pub trait CodeFinder: Send + Sync {
    /// A short name for this finder, used in logs.
    fn name(&self) -> &str;

    /// Returns the tests found under `path`, which may be a file or a directory.
    fn find_tests(&self, path: &Utf8Path) -> Result<Vec<TestRunSpec>, FindError>;
}

/// Finds tests by matching file names against a suffix.
#[derive(Clone, Debug)]
pub struct NamingPatternFinder {
    name: &'static str,
    suffix: &'static str,
    runner: RunnerKind,
    runner_classpath: Classpath,
}

impl NamingPatternFinder {
    /// JUnit test cases: files named `*Test.java`.
    pub fn junit(runner_classpath: Classpath) -> Self {
        Self {
            name: "junit",
            suffix: "Test.java",
            runner: RunnerKind::JUnit,
            runner_classpath,
        }
    }

    /// Caliper benchmarks: files named `*Benchmark.java`.
    pub fn caliper(runner_classpath: Classpath) -> Self {
        Self {
            name: "caliper",
            suffix: "Benchmark.java",
            runner: RunnerKind::Caliper,
            runner_classpath,
        }
    }

    /// Classes with a main method: any `*.java` file.
    pub fn main() -> Self {
        Self {
            name: "main",
            suffix: ".java",
            runner: RunnerKind::Main,
            runner_classpath: Classpath::new(),
        }
    }
}

impl CodeFinder for NamingPatternFinder {
    fn name(&self) -> &str {
        self.name
    }

    fn find_tests(&self, path: &Utf8Path) -> Result<Vec<TestRunSpec>, FindError> {
        let mut specs = Vec::new();
        for file in walk_files(path, self.suffix)? {
            let contents = read_source(&file)?;
            let Some(source) = JavaSource::new(&file, &contents) else {
                continue;
            };
            specs.push(source.into_spec(self.runner, &self.runner_classpath, None));
        }
        Ok(specs)
    }
}

/// Finds jtreg tests: Java sources containing an `@test` tag.
#[derive(Clone, Debug)]
pub struct JtregFinder {
    runner_classpath: Classpath,
}

impl JtregFinder {
    /// Creates a new jtreg finder.
    pub fn new(runner_classpath: Classpath) -> Self {
        Self { runner_classpath }
    }
}

static TEST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\*?\s*@test\b").expect("test tag regex is valid"));

static SUMMARY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\*?\s*@summary\s+(.*?)\s*$").expect("summary tag regex is valid")
});

impl CodeFinder for JtregFinder {
    fn name(&self) -> &str {
        "jtreg"
    }

    fn find_tests(&self, path: &Utf8Path) -> Result<Vec<TestRunSpec>, FindError> {
        let mut specs = Vec::new();
        for file in walk_files(path, ".java")? {
            let contents = read_source(&file)?;
            if !TEST_TAG.is_match(&contents) {
                continue;
            }
            let Some(source) = JavaSource::new(&file, &contents) else {
                continue;
            };
            let description = SUMMARY_TAG
                .captures(&contents)
                .map(|captures| captures[1].to_owned())
                .filter(|summary| !summary.is_empty());
            specs.push(source.into_spec(RunnerKind::Jtreg, &self.runner_classpath, description));
        }
        Ok(specs)
    }
}

/// Returns the default finders in priority order: jtreg, JUnit, Caliper, then main.
pub fn default_finders(runners: &RunnersConfig) -> Vec<Box<dyn CodeFinder>> {
    vec![
        Box::new(JtregFinder::new(runners.runner_classpath(RunnerKind::Jtreg))),
        Box::new(NamingPatternFinder::junit(
            runners.runner_classpath(RunnerKind::JUnit),
        )),
        Box::new(NamingPatternFinder::caliper(
            runners.runner_classpath(RunnerKind::Caliper),
        )),
        Box::new(NamingPatternFinder::main()),
    ]
}

/// Runs the finders over every input.
///
/// For each input, finders are consulted in order and the first to return a non-empty result
/// wins. Tests are returned in discovery order, deduplicated by qualified name with the first
/// occurrence kept.
pub fn find_all_tests(
    finders: &[Box<dyn CodeFinder>],
    inputs: &[Utf8PathBuf],
) -> Result<Vec<TestRun>, FindError> {
    let mut seen = HashSet::new();
    let mut test_runs = Vec::new();

    for input in inputs {
        for finder in finders {
            let specs = finder.find_tests(input)?;
            if specs.is_empty() {
                continue;
            }

            debug!(finder = finder.name(), %input, count = specs.len(), "found tests");
            for spec in specs {
                if seen.insert(spec.qualified_name.clone()) {
                    test_runs.push(TestRun::new(spec));
                } else {
                    debug!(qualified_name = %spec.qualified_name, "skipping duplicate test");
                }
            }
            break;
        }
    }

    Ok(test_runs)
}

fn walk_files(path: &Utf8Path, suffix: &str) -> Result<Vec<Utf8PathBuf>, FindError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|error| FindError::Walk {
            path: path.to_owned(),
            error,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file = Utf8PathBuf::try_from(entry.into_path()).map_err(FindError::NonUtf8Path)?;
        if file
            .file_name()
            .is_some_and(|name| name.ends_with(suffix))
        {
            files.push(file);
        }
    }
    Ok(files)
}

fn read_source(file: &Utf8Path) -> Result<String, FindError> {
    fs::read_to_string(file).map_err(|error| FindError::Read {
        path: file.to_owned(),
        error,
    })
}

static PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("package regex is valid")
});

/// The pieces of a Java source file needed to describe a test.
struct JavaSource<'a> {
    file: &'a Utf8Path,
    package: Option<&'a str>,
    class_name: &'a str,
}

impl<'a> JavaSource<'a> {
    fn new(file: &'a Utf8Path, contents: &'a str) -> Option<Self> {
        let class_name = file.file_stem()?;
        let package = PACKAGE
            .captures(contents)
            .and_then(|captures| captures.get(1))
            .map(|package| package.as_str());
        Some(Self {
            file,
            package,
            class_name,
        })
    }

    fn into_spec(
        self,
        runner: RunnerKind,
        runner_classpath: &Classpath,
        description: Option<String>,
    ) -> TestRunSpec {
        let test_class = match self.package {
            Some(package) => format!("{package}.{}", self.class_name),
            None => self.class_name.to_owned(),
        };
        let test_directory = self
            .file
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map_or_else(|| Utf8PathBuf::from("."), Utf8Path::to_owned);

        TestRunSpec {
            qualified_name: test_class.clone(),
            suite_name: self.package.unwrap_or_default().to_owned(),
            test_name: self.class_name.to_owned(),
            description,
            test_directory,
            test_java: self.file.to_owned(),
            test_class,
            runner,
            runner_classpath: runner_classpath.clone(),
        }
    }
}
