// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test pipeline: discovery, concurrent builds and serialized execution.
//!
//! The main structure in this module is [`Driver`].
//!
//! Tests are built on a pool of worker threads. Each worker sends the test it built onto a
//! bounded ready queue, blocking while the queue is full. The thread that called
//! [`Driver::execute`] drains the queue and runs tests one at a time, in the order they arrive.
//!
//! Build jobs own their state, so a fatal error is returned without waiting for builds still in
//! flight. Those finish in the background and are discarded.

use crate::{
    classpath::Classpath,
    config::RunConfig,
    errors::DriverError,
    expectations::ExpectationStore,
    finder::{CodeFinder, find_all_tests},
    helpers::plural,
    mode::{Mode, record},
    reporter::{Reporter, RunStats, TestEvent},
    test_run::{RunnerKind, TestResult, TestRun},
    time::stopwatch,
};
use camino::Utf8PathBuf;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    any::Any,
    collections::BTreeSet,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, error, info};

/// The default capacity of the ready queue.
pub const DEFAULT_READY_QUEUE_CAPACITY: usize = 4;

/// The default time to wait for the next built test.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Driver builder.
#[derive(Clone, Debug, Default)]
pub struct DriverBuilder {
    build_threads: Option<usize>,
    ready_queue_capacity: Option<usize>,
    ready_timeout: Option<Duration>,
}

impl DriverBuilder {
    /// Creates a builder from the `[run]` section of the config.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            build_threads: config.build_threads,
            ready_queue_capacity: Some(config.ready_queue_capacity),
            ready_timeout: Some(config.ready_timeout),
        }
    }

    /// Sets the number of build workers. Defaults to the number of logical CPUs.
    pub fn set_build_threads(&mut self, build_threads: usize) -> &mut Self {
        self.build_threads = Some(build_threads);
        self
    }

    /// Sets the number of built tests that may wait for execution before builds block.
    pub fn set_ready_queue_capacity(&mut self, capacity: usize) -> &mut Self {
        self.ready_queue_capacity = Some(capacity);
        self
    }

    /// Sets how long to wait for the next built test before failing the run.
    pub fn set_ready_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Creates a new driver.
    pub fn build(
        &self,
        mode: Mode,
        expectations: ExpectationStore,
        finders: Vec<Box<dyn CodeFinder>>,
    ) -> Result<Driver, DriverError> {
        let build_threads = self
            .build_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
            .max(1);
        let build_pool = ThreadPoolBuilder::new()
            .num_threads(build_threads)
            .thread_name(|idx| format!("dalvikrunner-build-{idx}"))
            .build()
            .map_err(DriverError::ThreadPool)?;
        debug!(build_threads, "created build pool");

        Ok(Driver {
            mode: Arc::new(mode),
            expectations,
            finders,
            ready_queue_capacity: self
                .ready_queue_capacity
                .unwrap_or(DEFAULT_READY_QUEUE_CAPACITY)
                .max(1),
            ready_timeout: self.ready_timeout.unwrap_or(DEFAULT_READY_TIMEOUT),
            build_pool,
        })
    }
}

/// Discovers, builds and runs tests, reporting each result against its expectation.
pub struct Driver {
    mode: Arc<Mode>,
    expectations: ExpectationStore,
    finders: Vec<Box<dyn CodeFinder>>,
    ready_queue_capacity: usize,
    ready_timeout: Duration,
    build_pool: ThreadPool,
}

impl Driver {
    /// Discovers tests under the given paths.
    pub fn find_tests(&self, inputs: &[Utf8PathBuf]) -> Result<Vec<Arc<TestRun>>, DriverError> {
        let test_runs: Vec<_> = find_all_tests(&self.finders, inputs)?
            .into_iter()
            .map(Arc::new)
            .collect();
        info!(
            "found {} {}",
            test_runs.len(),
            plural::tests_str(test_runs.len())
        );
        Ok(test_runs)
    }

    /// Discovers tests under the given paths, then executes them.
    pub fn run(
        &self,
        inputs: &[Utf8PathBuf],
        reporter: impl Reporter,
    ) -> Result<RunStats, DriverError> {
        let test_runs = self.find_tests(inputs)?;
        self.execute(&test_runs, reporter)
    }

    /// Builds and runs the given tests.
    ///
    /// Tests expected to be unsupported are skipped without being built. Every other test is
    /// built concurrently and run serially, and its outcome is compared against its expectation.
    /// Events are delivered to `reporter` in execution order.
    ///
    /// Failures local to a test are recorded as that test's result. An error is returned only
    /// if the run as a whole can't proceed.
    pub fn execute(
        &self,
        test_runs: &[Arc<TestRun>],
        mut reporter: impl Reporter,
    ) -> Result<RunStats, DriverError> {
        let stopwatch = stopwatch();
        let mut run_stats = RunStats {
            initial_count: test_runs.len(),
            ..RunStats::default()
        };
        reporter.report_event(&TestEvent::RunStarted {
            test_count: test_runs.len(),
        })?;

        let mut to_build = Vec::with_capacity(test_runs.len());
        for test_run in test_runs {
            let expected = self.expectations.lookup(test_run.qualified_name());
            test_run.set_expected(expected.clone());
            if expected.result() == TestResult::Unsupported {
                debug!(
                    qualified_name = test_run.qualified_name(),
                    "skipping unsupported test"
                );
                record(test_run, TestResult::Unsupported, Vec::new());
                run_stats.unsupported += 1;
                reporter.report_event(&TestEvent::TestSkipped { test_run })?;
            } else {
                to_build.push(Arc::clone(test_run));
            }
        }

        if !to_build.is_empty() {
            let runner_kinds: BTreeSet<RunnerKind> =
                to_build.iter().map(|test_run| test_run.runner()).collect();
            let mut runner_classpath = Classpath::new();
            for test_run in &to_build {
                runner_classpath.add_all(test_run.runner_classpath());
            }

            if let Err(error) = self.mode.prepare(runner_kinds, &runner_classpath) {
                self.mode.shutdown();
                return Err(error.into());
            }

            let res = self.build_and_run(to_build, &mut reporter, &mut run_stats);
            self.mode.shutdown();
            res?;
        }

        reporter.report_event(&TestEvent::RunFinished {
            start_time: stopwatch.start_time(),
            elapsed: stopwatch.elapsed(),
            run_stats,
        })?;
        Ok(run_stats)
    }

    fn build_and_run(
        &self,
        to_build: Vec<Arc<TestRun>>,
        reporter: &mut impl Reporter,
        run_stats: &mut RunStats,
    ) -> Result<(), DriverError> {
        let expected = to_build.len();
        let (sender, receiver) =
            crossbeam_channel::bounded::<Arc<TestRun>>(self.ready_queue_capacity);
        let canceled = Arc::new(AtomicBool::new(false));

        // Jobs aren't scoped: returning must not wait on a build that never finishes.
        for test_run in to_build {
            let sender = sender.clone();
            let canceled = Arc::clone(&canceled);
            let mode = Arc::clone(&self.mode);

            self.build_pool.spawn(move || {
                if canceled.load(Ordering::Acquire) {
                    return;
                }
                build_one(&mode, &test_run);
                // The receiver is only dropped if the run was canceled.
                let _ = sender.send(test_run);
            });
        }
        drop(sender);

        let res = self.receive_all(&receiver, expected, reporter, run_stats);
        if res.is_err() {
            canceled.store(true, Ordering::Release);
        }
        // Unblocks workers waiting on a full queue.
        drop(receiver);
        res
    }

    fn receive_all(
        &self,
        receiver: &Receiver<Arc<TestRun>>,
        expected: usize,
        reporter: &mut impl Reporter,
        run_stats: &mut RunStats,
    ) -> Result<(), DriverError> {
        for received in 0..expected {
            let test_run = match receiver.recv_timeout(self.ready_timeout) {
                Ok(test_run) => test_run,
                Err(RecvTimeoutError::Timeout) => {
                    error!(
                        expected,
                        received,
                        timeout = ?self.ready_timeout,
                        "timed out waiting for a built test"
                    );
                    return Err(DriverError::ReadyQueueTimeout {
                        expected,
                        received,
                        timeout: self.ready_timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DriverError::LostTests { expected, received });
                }
            };

            if test_run.is_runnable() {
                self.mode.run_test(&test_run);
            }
            if test_run.staged().is_some() {
                self.mode.cleanup(&test_run);
            }

            let matched = test_run.matches_expectation();
            run_stats.on_test_finished(matched);
            reporter.report_event(&TestEvent::TestFinished {
                test_run: &test_run,
                matched,
            })?;
        }

        Ok(())
    }
}

/// Builds a single test, turning a panic into an `ERROR` result.
fn build_one(mode: &Mode, test_run: &TestRun) {
    let res = panic::catch_unwind(AssertUnwindSafe(|| mode.build_and_install(test_run)));
    if let Err(payload) = res {
        let message = panic_message(payload.as_ref());
        error!(
            qualified_name = test_run.qualified_name(),
            "build panicked: {message}"
        );
        if test_run.result().is_none() {
            record(
                test_run,
                TestResult::Error,
                vec![format!("build panicked: {message}")],
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "(unknown panic payload)"
    }
}
