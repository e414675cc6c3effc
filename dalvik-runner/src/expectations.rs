// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expected results for tests, keyed by qualified name.
//!
//! Expectation files are line-based. Blank lines and lines starting with `#` are ignored. Records
//! are written either in block form:
//!
//! ```text
//! test java.util.Foo.testBar
//! result EXEC_FAILED
//! pattern .*NullPointerException.*
//! ```
//!
//! or in compact form, one record per line:
//!
//! ```text
//! java.util.Foo.testBar=result:EXEC_FAILED pattern:.*NullPointerException.*
//! ```
//!
//! Lookups fall back to dot-delimited ancestors of the qualified name, so an entry for a class or
//! package covers every test underneath it.

use crate::{
    errors::{ExpectationLineError, ExpectationParseError},
    test_run::{TestOutcome, TestResult},
};
use camino::{Utf8Path, Utf8PathBuf};
use regex::{Regex, RegexBuilder};
use std::{
    collections::HashMap,
    io,
    sync::LazyLock,
};
use tracing::debug;

/// An expected result: the result kind, plus a pattern the test's output must match.
#[derive(Clone, Debug)]
pub struct ExpectedResult {
    result: TestResult,
    pattern: String,
    regex: Regex,
}

impl ExpectedResult {
    /// The pattern used when an expectation doesn't specify one.
    pub const MATCH_ALL_PATTERN: &'static str = ".*";

    /// Creates a new expected result.
    ///
    /// The pattern must match the entire output (lines joined with `\n`). `.` matches newlines, and
    /// `^` and `$` match at line boundaries.
    pub fn new(result: TestResult, pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let regex = RegexBuilder::new(&format!(r"\A(?:{pattern})\z"))
            .dot_matches_new_line(true)
            .multi_line(true)
            .build()?;
        Ok(Self {
            result,
            pattern,
            regex,
        })
    }

    /// The default expectation: success, with any output.
    pub fn success() -> Self {
        Self::new(TestResult::Success, Self::MATCH_ALL_PATTERN)
            .expect("match-all pattern is valid")
    }

    pub(crate) fn default_ref() -> &'static Self {
        static DEFAULT: LazyLock<ExpectedResult> = LazyLock::new(ExpectedResult::success);
        &DEFAULT
    }

    /// Returns the expected result kind.
    pub fn result(&self) -> TestResult {
        self.result
    }

    /// Returns the output pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if the given result and output satisfy this expectation.
    pub fn matches_output(&self, result: TestResult, output: &[String]) -> bool {
        result == self.result && self.regex.is_match(&output.join("\n"))
    }

    /// Returns true if the given outcome satisfies this expectation.
    pub fn matches(&self, outcome: &TestOutcome) -> bool {
        self.matches_output(outcome.result(), outcome.output())
    }
}

impl PartialEq for ExpectedResult {
    fn eq(&self, other: &Self) -> bool {
        self.result == other.result && self.pattern == other.pattern
    }
}

impl Eq for ExpectedResult {}

/// A table of expected results keyed by qualified name.
#[derive(Clone, Debug, Default)]
pub struct ExpectationStore {
    entries: HashMap<String, ExpectedResult>,
}

impl ExpectationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads expectations from the given files, in order.
    ///
    /// Files that don't exist contribute no entries. If several files define the same name, the
    /// last one loaded wins.
    pub fn load(
        paths: impl IntoIterator<Item = impl AsRef<Utf8Path>>,
    ) -> Result<Self, ExpectationParseError> {
        let mut store = Self::new();
        for path in paths {
            store.load_file(path.as_ref())?;
        }
        Ok(store)
    }

    /// Loads expectations from a single file, returning the number of records read.
    pub fn load_file(&mut self, path: &Utf8Path) -> Result<usize, ExpectationParseError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(%path, "expectations file not found, skipping");
                return Ok(0);
            }
            Err(error) => {
                return Err(ExpectationParseError::Read {
                    file: path.to_owned(),
                    error,
                });
            }
        };

        let count = self.parse_str(path, &contents)?;
        debug!(%path, count, "loaded expectations");
        Ok(count)
    }

    /// Parses expectations from a string. `file` is used for error messages.
    ///
    /// Returns the number of records read.
    pub fn parse_str(
        &mut self,
        file: &Utf8Path,
        contents: &str,
    ) -> Result<usize, ExpectationParseError> {
        let mut parser = Parser::new(file);
        for (idx, line) in contents.lines().enumerate() {
            parser.parse_line(idx + 1, line)?;
        }
        let records = parser.finish()?;

        let count = records.len();
        self.entries.extend(records);
        Ok(count)
    }

    /// Adds or replaces an expectation.
    pub fn insert(&mut self, qualified_name: impl Into<String>, expected: ExpectedResult) {
        self.entries.insert(qualified_name.into(), expected);
    }

    /// Looks up the expectation for a qualified name.
    ///
    /// If there's no exact match, the trailing `.segment` is stripped and the lookup retried until
    /// no dots remain. If nothing matches, the default expectation (success, any output) is
    /// returned.
    pub fn lookup(&self, qualified_name: &str) -> &ExpectedResult {
        let mut name = qualified_name;
        loop {
            if let Some(expected) = self.entries.get(name) {
                return expected;
            }
            match name.rfind('.') {
                Some(idx) => name = &name[..idx],
                None => return ExpectedResult::default_ref(),
            }
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s+(.+)$").expect("key-value regex is valid"));

static COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+?)=result:(\S+)(?:\s+pattern:(.*))?$").expect("compact regex is valid")
});

struct PendingRecord {
    name: String,
    result: Option<TestResult>,
    // The line number is kept to report invalid patterns.
    pattern: Option<(usize, String)>,
}

struct Parser<'a> {
    file: &'a Utf8Path,
    current: Option<PendingRecord>,
    records: Vec<(String, ExpectedResult)>,
}

impl<'a> Parser<'a> {
    fn new(file: &'a Utf8Path) -> Self {
        Self {
            file,
            current: None,
            records: Vec::new(),
        }
    }

    fn parse_line(&mut self, line_number: usize, line: &str) -> Result<(), ExpectationParseError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        if let Some(captures) = COMPACT.captures(line) {
            self.flush()?;
            let result = self.parse_result(line_number, &captures[2])?;
            let pattern = captures
                .get(3)
                .map(|pattern| (line_number, pattern.as_str().to_owned()));
            self.current = Some(PendingRecord {
                name: captures[1].to_owned(),
                result: Some(result),
                pattern,
            });
            return self.flush();
        }

        let Some(captures) = KEY_VALUE.captures(line) else {
            return Err(self.line_error(
                line_number,
                ExpectationLineError::UnexpectedLine {
                    line: line.to_owned(),
                },
            ));
        };
        let key = &captures[1];
        let value = captures[2].trim();

        match key {
            "test" => {
                self.flush()?;
                self.current = Some(PendingRecord {
                    name: value.to_owned(),
                    result: None,
                    pattern: None,
                });
            }
            "result" => {
                let result = self.parse_result(line_number, value)?;
                let current = self.current_mut(line_number, key)?;
                // The first result in a record wins.
                current.result.get_or_insert(result);
            }
            "pattern" => {
                let current = self.current_mut(line_number, key)?;
                current
                    .pattern
                    .get_or_insert_with(|| (line_number, value.to_owned()));
            }
            other => {
                return Err(self.line_error(
                    line_number,
                    ExpectationLineError::UnknownKey {
                        key: other.to_owned(),
                    },
                ));
            }
        }

        Ok(())
    }

    fn finish(mut self) -> Result<Vec<(String, ExpectedResult)>, ExpectationParseError> {
        self.flush()?;
        Ok(self.records)
    }

    fn parse_result(
        &self,
        line_number: usize,
        value: &str,
    ) -> Result<TestResult, ExpectationParseError> {
        value
            .parse()
            .map_err(|err| self.line_error(line_number, ExpectationLineError::UnknownResult(err)))
    }

    fn current_mut(
        &mut self,
        line_number: usize,
        key: &str,
    ) -> Result<&mut PendingRecord, ExpectationParseError> {
        let file = self.file;
        self.current
            .as_mut()
            .ok_or_else(|| ExpectationParseError::Line {
                file: file.to_owned(),
                line_number,
                kind: ExpectationLineError::NoCurrentTest {
                    key: key.to_owned(),
                },
            })
    }

    fn flush(&mut self) -> Result<(), ExpectationParseError> {
        let Some(record) = self.current.take() else {
            return Ok(());
        };

        let result = record.result.unwrap_or(TestResult::Success);
        let expected = match record.pattern {
            Some((line_number, pattern)) => ExpectedResult::new(result, pattern.as_str())
                .map_err(|error| {
                    self.line_error(
                        line_number,
                        ExpectationLineError::InvalidPattern { pattern, error },
                    )
                })?,
            None => ExpectedResult::new(result, ExpectedResult::MATCH_ALL_PATTERN)
                .expect("match-all pattern is valid"),
        };
        self.records.push((record.name, expected));
        Ok(())
    }

    fn line_error(&self, line_number: usize, kind: ExpectationLineError) -> ExpectationParseError {
        ExpectationParseError::Line {
            file: Utf8PathBuf::from(self.file),
            line_number,
            kind,
        }
    }
}
