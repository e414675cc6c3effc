// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from test events.

use super::events::TestEvent;
use crate::{errors::WriteEventError, test_run::TestRun};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::fs::{self, File};

/// The name of the report, and the stem of the file it's written to.
pub const REPORT_NAME: &str = "dalvikrunner";

/// Collects finished tests and writes `<dir>/dalvikrunner.xml` at the end of the run.
///
/// Each suite name gets its own `<testsuite>`. Unsupported tests are reported as skipped.
#[derive(Clone, Debug)]
pub(super) struct JunitReporter {
    path: Utf8PathBuf,
    test_suites: DebugIgnore<IndexMap<String, TestSuite>>,
}

impl JunitReporter {
    pub(super) fn new(dir: &Utf8Path) -> Self {
        Self {
            path: dir.join(format!("{REPORT_NAME}.xml")),
            test_suites: DebugIgnore(IndexMap::new()),
        }
    }

    pub(super) fn write_event(&mut self, event: &TestEvent<'_>) -> Result<(), WriteEventError> {
        match event {
            TestEvent::RunStarted { .. } => {}
            TestEvent::TestSkipped { test_run } => {
                let mut status = TestCaseStatus::skipped();
                status.set_message("expected to be unsupported");
                self.add_test_case(test_run, status);
            }
            TestEvent::TestFinished { test_run, matched } => {
                let status = if *matched {
                    TestCaseStatus::success()
                } else {
                    let expected = test_run.expected().result();
                    let actual = test_run
                        .result()
                        .map_or("(no result)", |result| result.as_str());
                    let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                    status
                        .set_type(actual)
                        .set_message(format!("expected {expected}, got {actual}"));
                    if let Some(description) = test_run.description() {
                        status.set_description(description);
                    }
                    status
                };
                self.add_test_case(test_run, status);
            }
            TestEvent::RunFinished {
                start_time,
                elapsed,
                ..
            } => {
                let mut report = Report::new(REPORT_NAME);
                report
                    .set_timestamp(*start_time)
                    .set_time(*elapsed)
                    .add_test_suites(self.test_suites.drain(..).map(|(_, suite)| suite));

                if let Some(dir) = self.path.parent() {
                    fs::create_dir_all(dir).map_err(|error| WriteEventError::Fs {
                        file: dir.to_path_buf(),
                        error,
                    })?;
                }
                let f = File::create(&self.path).map_err(|error| WriteEventError::Fs {
                    file: self.path.clone(),
                    error,
                })?;
                report
                    .serialize(f)
                    .map_err(|error| WriteEventError::Junit {
                        file: self.path.clone(),
                        error,
                    })?;
            }
        }
        Ok(())
    }

    fn add_test_case(&mut self, test_run: &TestRun, status: TestCaseStatus) {
        let mut test_case = TestCase::new(test_run.test_name(), status);
        test_case.set_classname(test_run.suite_name());
        if let Some(outcome) = test_run.outcome() {
            if let Some(start_time) = outcome.start_time() {
                test_case.set_timestamp(start_time);
            }
            test_case.set_time(outcome.time_taken());
            if !outcome.output().is_empty() {
                test_case.set_system_out(outcome.output().join("\n"));
            }
        }

        self.test_suites
            .entry(test_run.suite_name().to_owned())
            .or_insert_with_key(|name| TestSuite::new(name.as_str()))
            .add_test_case(test_case);
    }
}
