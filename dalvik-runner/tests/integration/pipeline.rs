// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use color_eyre::eyre::Result;
use dalvik_runner::{
    config::DalvikRunnerConfig,
    context::RunContext,
    driver::{Driver, DriverBuilder},
    errors::DriverError,
    expectations::{ExpectationStore, ExpectedResult},
    finder::default_finders,
    harness::SUCCESS_SENTINEL,
    mode::Mode,
    reporter::RunStats,
    test_run::TestResult,
};
use pretty_assertions::assert_eq;
use std::{
    fs,
    sync::Arc,
    time::{Duration, Instant},
};

fn make_mode(context: &Arc<RunContext>, recorder: &Recorder, launcher: ShellLauncher) -> Mode {
    Mode::new(
        Arc::clone(context),
        FakeCompiler::new(recorder),
        RecordingEnvironment::new(context.host_run_dir(), recorder),
        launcher,
    )
    .timeout(Duration::from_secs(30))
}

fn make_driver(
    mode: Mode,
    expectations: ExpectationStore,
    configure: impl FnOnce(&mut DriverBuilder),
) -> Driver {
    let mut builder = DriverBuilder::default();
    configure(&mut builder);
    builder
        .build(mode, expectations, Vec::new())
        .expect("built driver")
}

fn run_context() -> Result<Arc<RunContext>> {
    Ok(Arc::new(RunContext::new(false)?))
}

fn expect(store: &mut ExpectationStore, name: &str, result: TestResult, pattern: &str) {
    store.insert(
        name,
        ExpectedResult::new(result, pattern).expect("valid pattern"),
    );
}

#[test]
fn unsupported_tests_are_never_built() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();
    let mut expectations = ExpectationStore::new();
    expect(&mut expectations, "p.Skipped", TestResult::Unsupported, ".*");

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        expectations,
        |_| {},
    );
    let runs = [
        make_run(sources.path(), "First", passing_script()),
        make_run(sources.path(), "Skipped", passing_script()),
        make_run(sources.path(), "Second", passing_script()),
    ];

    let mut reporter = RecordingReporter::default();
    let stats = driver.execute(&runs, &mut reporter)?;

    assert_eq!(
        stats,
        RunStats {
            initial_count: 3,
            finished: 2,
            passed: 2,
            failed: 0,
            unsupported: 1,
        }
    );
    assert!(stats.is_success());
    assert_eq!(runs[1].result(), Some(TestResult::Unsupported));
    assert!(!recorder.compiled().contains(&"Skipped".to_owned()));
    assert!(!recorder.staged().contains(&"p.Skipped".to_owned()));
    assert!(!recorder.launched().contains(&"p.Skipped".to_owned()));

    assert_eq!(reporter.events[0], Recorded::RunStarted(3));
    assert_eq!(reporter.events[1], Recorded::Skipped("p.Skipped".to_owned()));
    assert_eq!(reporter.events.last(), Some(&Recorded::RunFinished));
    let mut finished = reporter.finished_names();
    finished.sort();
    assert_eq!(finished, ["p.First", "p.Second"]);

    Ok(())
}

#[test]
fn build_failures_are_local_to_a_test() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        ExpectationStore::new(),
        |builder| {
            builder.set_build_threads(2);
        },
    );
    let runs = [
        make_run(sources.path(), "BrokenTest", passing_script()),
        make_run(sources.path(), "PanicTest", passing_script()),
        make_run(sources.path(), "GoodTest", passing_script()),
    ];

    let mut reporter = RecordingReporter::default();
    let stats = driver.execute(&runs, &mut reporter)?;
    assert_eq!((stats.finished, stats.passed, stats.failed), (3, 1, 2));
    assert!(!stats.is_success());

    let broken = runs[0].outcome().expect("broken test has a result");
    assert_eq!(broken.result(), TestResult::CompileFailed);
    assert!(broken.output()[0].ends_with("BrokenTest.java:3: error: cannot find symbol"));

    let panicked = runs[1].outcome().expect("panicking test has a result");
    assert_eq!(panicked.result(), TestResult::Error);
    assert_eq!(
        panicked.output(),
        ["build panicked: compiler crashed on PanicTest"]
    );

    assert_eq!(runs[2].result(), Some(TestResult::Success));
    assert_eq!(reporter.finished("p.GoodTest"), (Some(TestResult::Success), true));
    assert_eq!(
        reporter.finished("p.BrokenTest"),
        (Some(TestResult::CompileFailed), false)
    );

    // Only the test that built was staged and launched.
    assert_eq!(recorder.staged(), ["p.GoodTest"]);
    assert_eq!(recorder.launched(), ["p.GoodTest"]);

    Ok(())
}

#[test]
fn execution_is_serialized() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();

    // Each test holds a lock directory while it runs, and fails if another test holds it.
    let lock = sources.path().join("lock");
    let script =
        format!("mkdir {lock} || exit 1; sleep 0.05; rmdir {lock}; echo '{SUCCESS_SENTINEL}'");

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        ExpectationStore::new(),
        |builder| {
            builder.set_build_threads(4);
        },
    );
    let runs: Vec<_> = (0..8)
        .map(|idx| make_run(sources.path(), &format!("Test{idx}"), script.clone()))
        .collect();

    let mut reporter = RecordingReporter::default();
    let stats = driver.execute(&runs, &mut reporter)?;

    for run in &runs {
        assert_eq!(
            run.result(),
            Some(TestResult::Success),
            "{} ran alone",
            run.qualified_name()
        );
    }
    assert_eq!(stats.passed, 8);
    // Results are reported in execution order.
    assert_eq!(reporter.finished_names(), recorder.launched());

    Ok(())
}

#[test]
fn cleanup_follows_each_run() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        ExpectationStore::new(),
        |builder| {
            builder.set_build_threads(4);
        },
    );
    let runs: Vec<_> = (0..6)
        .map(|idx| make_run(sources.path(), &format!("Test{idx}"), passing_script()))
        .collect();

    let stats = driver.execute(&runs, RecordingReporter::default())?;
    assert_eq!(stats.passed, 6);

    // Each test is cleaned up before the next one is launched.
    let lifecycle = recorder.lifecycle();
    assert_eq!(lifecycle.len(), 12, "one launch and one cleanup per test");
    let expected: Vec<_> = recorder
        .launched()
        .iter()
        .flat_map(|name| [format!("launch:{name}"), format!("cleanup:{name}")])
        .collect();
    assert_eq!(lifecycle, expected);

    Ok(())
}

#[test]
fn ready_queue_applies_backpressure() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();
    let capacity = 2;

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        ExpectationStore::new(),
        |builder| {
            builder
                .set_build_threads(1)
                .set_ready_queue_capacity(capacity);
        },
    );
    let script = format!("sleep 0.05; echo '{SUCCESS_SENTINEL}'");
    let runs: Vec<_> = (0..10)
        .map(|idx| make_run(sources.path(), &format!("Test{idx}"), script.clone()))
        .collect();

    let stats = driver.execute(&runs, RecordingReporter::default())?;
    assert_eq!(stats.passed, 10);

    // At most `capacity` tests wait in the queue, plus one held by the blocked worker and the
    // one just dequeued.
    let max_backlog = recorder
        .max_backlog
        .load(std::sync::atomic::Ordering::SeqCst);
    assert!(
        max_backlog <= capacity + 2,
        "backlog {max_backlog} exceeds queue capacity {capacity}"
    );

    Ok(())
}

#[test]
fn timeout_is_recorded_and_run_continues() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();
    let mut expectations = ExpectationStore::new();
    expect(
        &mut expectations,
        "p.Slow",
        TestResult::ExecTimeout,
        r"Exceeded timeout! \(\d+s\)",
    );

    let mode = make_mode(&context, &recorder, ShellLauncher::new(&recorder))
        .timeout(Duration::from_millis(300));
    let driver = make_driver(mode, expectations, |builder| {
        builder.set_build_threads(1);
    });
    // The marker only appears if the slow test survives its timeout.
    let marker = sources.path().join("slow-finished");
    let runs = [
        make_run(sources.path(), "Slow", format!("sleep 1; touch {marker}")),
        make_run(sources.path(), "Fast", passing_script()),
    ];

    let mut reporter = RecordingReporter::default();
    let stats = driver.execute(&runs, &mut reporter)?;

    let slow = runs[0].outcome().expect("slow test has a result");
    assert_eq!(slow.result(), TestResult::ExecTimeout);
    assert_eq!(slow.output(), ["Exceeded timeout! (0s)"]);
    assert!(slow.time_taken() < Duration::from_secs(10), "killed promptly");
    assert_eq!(runs[1].result(), Some(TestResult::Success));
    assert_eq!(stats.passed, 2, "timeout was expected");

    std::thread::sleep(Duration::from_secs(2));
    assert!(!marker.exists(), "slow test was killed, not left running");

    Ok(())
}

#[test]
fn outcomes_are_compared_against_expectations() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();
    let mut expectations = ExpectationStore::new();
    expectations.parse_str(
        Utf8Path::new("known-failures.txt"),
        "p.KnownFailure=result:EXEC_FAILED pattern:.*expected:<1> but was:<2>.*\n\
         p.WrongMessage=result:EXEC_FAILED pattern:.*expected:<1> but was:<2>.*\n",
    )?;

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        expectations,
        |_| {},
    );
    let failing = "echo 'start'; echo 'AssertionFailedError: expected:<1> but was:<2>'; exit 1";
    let runs = [
        make_run(sources.path(), "KnownFailure", failing),
        make_run(sources.path(), "WrongMessage", "echo 'NullPointerException'"),
        make_run(sources.path(), "Passing", passing_script()),
    ];

    let mut reporter = RecordingReporter::default();
    let stats = driver.execute(&runs, &mut reporter)?;

    assert_eq!(
        reporter.finished("p.KnownFailure"),
        (Some(TestResult::ExecFailed), true)
    );
    assert_eq!(
        reporter.finished("p.WrongMessage"),
        (Some(TestResult::ExecFailed), false)
    );
    assert_eq!(
        reporter.finished("p.Passing"),
        (Some(TestResult::Success), true)
    );
    assert_eq!(runs[2].outcome().unwrap().output(), ["running"]);
    assert_eq!((stats.passed, stats.failed), (2, 1));

    Ok(())
}

#[test]
fn hung_build_is_fatal() -> Result<()> {
    let sources = source_dir();
    let context = run_context()?;
    let recorder = Recorder::default();

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        ExpectationStore::new(),
        |builder| {
            builder
                .set_build_threads(1)
                .set_ready_timeout(Duration::from_millis(200));
        },
    );
    let runs = [make_run(sources.path(), "HangTest", passing_script())];

    let mut reporter = RecordingReporter::default();
    let start = Instant::now();
    let error = driver
        .execute(&runs, &mut reporter)
        .expect_err("ready queue timed out");
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "returned without waiting for the hung build, took {:?}",
        start.elapsed()
    );
    assert!(
        matches!(
            error,
            DriverError::ReadyQueueTimeout {
                expected: 1,
                received: 0,
                ..
            }
        ),
        "unexpected error: {error}"
    );
    assert_eq!(reporter.events, [Recorded::RunStarted(1)]);
    assert!(recorder.launched().is_empty());

    Ok(())
}

#[test]
fn empty_run_does_not_prepare() -> Result<()> {
    let context = run_context()?;
    let recorder = Recorder::default();

    let driver = make_driver(
        make_mode(&context, &recorder, ShellLauncher::new(&recorder)),
        ExpectationStore::new(),
        |_| {},
    );
    let mut reporter = RecordingReporter::default();
    let stats = driver.execute(&[], &mut reporter)?;

    assert_eq!(stats, RunStats::default());
    assert!(recorder.compiled().is_empty(), "harness not compiled");
    assert_eq!(
        reporter.events,
        [Recorded::RunStarted(0), Recorded::RunFinished]
    );

    Ok(())
}

#[test]
fn run_discovers_then_executes() -> Result<()> {
    let sources = source_dir();
    let package_dir = sources.path().join("p");
    fs::create_dir_all(&package_dir)?;
    fs::write(
        package_dir.join("AlphaTest.java"),
        "package p;\n\npublic class AlphaTest extends junit.framework.TestCase {}\n",
    )?;
    fs::write(
        package_dir.join("Tool.java"),
        "package p;\n\npublic class Tool {}\n",
    )?;

    let context = run_context()?;
    let recorder = Recorder::default();
    let config = DalvikRunnerConfig::default_config();
    let launcher = ShellLauncher::new(&recorder).script("p.AlphaTest", passing_script());
    let mode = make_mode(&context, &recorder, launcher);
    let driver = DriverBuilder::from_config(&config.run)
        .build(mode, ExpectationStore::new(), default_finders(&config.runners))
        .expect("built driver");

    let mut reporter = RecordingReporter::default();
    let stats = driver.run(&[sources.path().to_owned()], &mut reporter)?;

    // The JUnit finder claimed the directory, so the plain class was not picked up.
    assert_eq!(reporter.finished_names(), ["p.AlphaTest"]);
    assert_eq!(stats.passed, 1);
    assert_eq!(recorder.compiled(), ["TestRunner", "AlphaTest"]);
    assert!(
        context
            .harness_sources_dir()
            .join("dalvik/runner/JUnitRunner.java")
            .is_file()
    );

    Ok(())
}
