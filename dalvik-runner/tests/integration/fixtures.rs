// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use dalvik_runner::{
    classpath::Classpath,
    command::Command,
    compiler::{CompileRequest, Compiler},
    environment::{Environment, HostEnvironment, StageRequest, StagedTest},
    errors::{CompileError, EnvironmentError, WriteEventError},
    harness::SUCCESS_SENTINEL,
    launcher::{LaunchRequest, Launcher},
    reporter::{Reporter, TestEvent},
    test_run::{RunnerKind, TestResult, TestRun, TestRunSpec},
};
use std::{
    collections::HashMap,
    fs,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

/// Shared counters and logs, cloned into each fake.
#[derive(Clone, Debug, Default)]
pub(crate) struct Recorder {
    /// File stems of everything compiled, in order. The harness shows up as `TestRunner`.
    pub(crate) compiled: Arc<Mutex<Vec<String>>>,

    /// Qualified names of everything staged.
    pub(crate) staged: Arc<Mutex<Vec<String>>>,

    /// Qualified names of everything launched, in order.
    pub(crate) launched: Arc<Mutex<Vec<String>>>,

    /// The number of test builds that finished compiling.
    pub(crate) built: Arc<AtomicUsize>,

    /// The largest number of built tests not yet launched, observed at launch time.
    pub(crate) max_backlog: Arc<AtomicUsize>,

    /// Launches and cleanups as `launch:<name>` and `cleanup:<name>`, in order.
    pub(crate) lifecycle: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn compiled(&self) -> Vec<String> {
        self.compiled.lock().unwrap().clone()
    }

    pub(crate) fn staged(&self) -> Vec<String> {
        self.staged.lock().unwrap().clone()
    }

    pub(crate) fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub(crate) fn lifecycle(&self) -> Vec<String> {
        self.lifecycle.lock().unwrap().clone()
    }
}

/// Compiles by writing a marker class file. The behavior depends on the source's file name:
///
/// * `Broken*`: fails with compiler diagnostics.
/// * `Panic*`: panics.
/// * `Hang*`: blocks for a minute first, far longer than any ready timeout used in tests.
#[derive(Clone, Debug)]
pub(crate) struct FakeCompiler {
    recorder: Recorder,
}

impl FakeCompiler {
    pub(crate) fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
        }
    }
}

impl Compiler for FakeCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<(), CompileError> {
        let source = request.sources.first().expect("at least one source");
        let stem = source.file_stem().expect("source has a stem").to_owned();
        self.recorder.compiled.lock().unwrap().push(stem.clone());

        if stem.starts_with("Broken") {
            return Err(CompileError::Diagnostics {
                output: vec![format!("{source}:3: error: cannot find symbol")],
            });
        }
        if stem.starts_with("Panic") {
            panic!("compiler crashed on {stem}");
        }
        if stem.starts_with("Hang") {
            thread::sleep(Duration::from_secs(60));
        }

        fs::create_dir_all(request.output_dir).expect("created output dir");
        fs::write(request.output_dir.join(format!("{stem}.class")), b"").expect("wrote class");
        if stem != "TestRunner" {
            self.recorder.built.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Stages on the host, recording what was staged.
pub(crate) struct RecordingEnvironment {
    inner: HostEnvironment,
    recorder: Recorder,
}

impl RecordingEnvironment {
    pub(crate) fn new(run_dir: Utf8PathBuf, recorder: &Recorder) -> Self {
        Self {
            inner: HostEnvironment::new(run_dir, true),
            recorder: recorder.clone(),
        }
    }
}

impl Environment for RecordingEnvironment {
    fn prepare(&self, harness_classes: &Utf8Path) -> Result<Classpath, EnvironmentError> {
        self.inner.prepare(harness_classes)
    }

    fn stage(&self, request: &StageRequest<'_>) -> Result<StagedTest, EnvironmentError> {
        self.recorder
            .staged
            .lock()
            .unwrap()
            .push(request.test_run.qualified_name().to_owned());
        self.inner.stage(request)
    }

    fn cleanup(&self, test_run: &TestRun) -> Result<(), EnvironmentError> {
        self.recorder
            .lifecycle
            .lock()
            .unwrap()
            .push(format!("cleanup:{}", test_run.qualified_name()));
        self.inner.cleanup(test_run)
    }

    fn shutdown(&self) -> Result<(), EnvironmentError> {
        self.inner.shutdown()
    }
}

/// Runs a shell script per test: the one registered for its qualified name, or otherwise its test
/// class.
pub(crate) struct ShellLauncher {
    scripts: HashMap<String, String>,
    recorder: Recorder,
}

impl ShellLauncher {
    pub(crate) fn new(recorder: &Recorder) -> Self {
        Self {
            scripts: HashMap::new(),
            recorder: recorder.clone(),
        }
    }

    pub(crate) fn script(mut self, qualified_name: &str, script: impl Into<String>) -> Self {
        self.scripts.insert(qualified_name.to_owned(), script.into());
        self
    }
}

impl Launcher for ShellLauncher {
    fn command(&self, request: &LaunchRequest<'_>) -> Command {
        let qualified_name = request.test_run.qualified_name();
        let mut launched = self.recorder.launched.lock().unwrap();
        let backlog = self.recorder.built.load(Ordering::SeqCst) - launched.len();
        self.recorder.max_backlog.fetch_max(backlog, Ordering::SeqCst);
        launched.push(qualified_name.to_owned());
        self.recorder
            .lifecycle
            .lock()
            .unwrap()
            .push(format!("launch:{qualified_name}"));

        let script = self
            .scripts
            .get(qualified_name)
            .map_or(request.test_run.test_class(), String::as_str);
        let mut command = Command::new("sh");
        command
            .args(["-c", script])
            .working_dir(request.staged.user_dir());
        command
    }
}

/// A script that prints some output and reports success.
pub(crate) fn passing_script() -> String {
    format!("echo 'running'; echo '{SUCCESS_SENTINEL}'")
}

/// Creates a test in package `p` whose test class is the given shell script.
pub(crate) fn make_run(
    source_dir: &Utf8Path,
    name: &str,
    script: impl Into<String>,
) -> Arc<TestRun> {
    Arc::new(TestRun::new(TestRunSpec {
        qualified_name: format!("p.{name}"),
        suite_name: "p".to_owned(),
        test_name: name.to_owned(),
        description: None,
        test_directory: source_dir.to_owned(),
        test_java: source_dir.join(format!("{name}.java")),
        test_class: script.into(),
        runner: RunnerKind::Main,
        runner_classpath: Classpath::new(),
    }))
}

/// A reporter event, with the details the tests care about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Recorded {
    RunStarted(usize),
    Skipped(String),
    Finished {
        name: String,
        result: Option<TestResult>,
        matched: bool,
    },
    RunFinished,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    pub(crate) events: Vec<Recorded>,
}

impl RecordingReporter {
    /// Returns the qualified names of finished tests, in order.
    pub(crate) fn finished_names(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Recorded::Finished { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the finished event for a test.
    pub(crate) fn finished(&self, qualified_name: &str) -> (Option<TestResult>, bool) {
        self.events
            .iter()
            .find_map(|event| match event {
                Recorded::Finished {
                    name,
                    result,
                    matched,
                } if name == qualified_name => Some((*result, *matched)),
                _ => None,
            })
            .unwrap_or_else(|| panic!("{qualified_name} finished"))
    }
}

impl Reporter for RecordingReporter {
    fn report_event(&mut self, event: &TestEvent<'_>) -> Result<(), WriteEventError> {
        let recorded = match event {
            TestEvent::RunStarted { test_count } => Recorded::RunStarted(*test_count),
            TestEvent::TestSkipped { test_run } => {
                Recorded::Skipped(test_run.qualified_name().to_owned())
            }
            TestEvent::TestFinished { test_run, matched } => Recorded::Finished {
                name: test_run.qualified_name().to_owned(),
                result: test_run.result(),
                matched: *matched,
            },
            TestEvent::RunFinished { .. } => Recorded::RunFinished,
        };
        self.events.push(recorded);
        Ok(())
    }
}

/// A temporary directory standing in for test sources.
pub(crate) fn source_dir() -> Utf8TempDir {
    Utf8TempDir::new().expect("created temp dir")
}
