// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted by the driver.
//!
//! Events are delivered in execution order on the thread that called
//! [`Driver::execute`](crate::driver::Driver::execute).

use crate::test_run::TestRun;
use chrono::{DateTime, Local};
use std::time::Duration;

/// A test event.
#[derive(Clone, Debug)]
pub enum TestEvent<'a> {
    /// The run started.
    RunStarted {
        /// The number of tests discovered, including unsupported ones.
        test_count: usize,
    },

    /// A test was skipped because it is expected to be unsupported. It was never built.
    TestSkipped {
        /// The test that was skipped.
        test_run: &'a TestRun,
    },

    /// A test finished, either because it was executed or because it failed to build.
    TestFinished {
        /// The test that finished. Its outcome is always set.
        test_run: &'a TestRun,

        /// Whether the outcome matched the expected result.
        matched: bool,
    },

    /// The run finished.
    RunFinished {
        /// The time at which the run started.
        start_time: DateTime<Local>,

        /// The amount of time it took for the run to finish.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were discovered.
    ///
    /// If the run is interrupted, `finished + unsupported` will be less than this.
    pub initial_count: usize,

    /// The number of tests that finished, whether they were executed or failed to build.
    pub finished: usize,

    /// The number of finished tests whose outcome matched their expectation.
    pub passed: usize,

    /// The number of finished tests whose outcome did not match their expectation.
    pub failed: usize,

    /// The number of tests skipped as unsupported.
    pub unsupported: usize,
}

impl RunStats {
    /// Returns true if no finished test produced an unexpected outcome.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Returns true if every discovered test was either finished or skipped.
    pub fn is_complete(&self) -> bool {
        self.finished + self.unsupported == self.initial_count
    }

    pub(crate) fn on_test_finished(&mut self, matched: bool) {
        self.finished += 1;
        if matched {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}
