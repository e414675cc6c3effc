// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{DalvikRunnerExitCode, ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use dalvik_runner::{
    compiler::Javac,
    config::DalvikRunnerConfig,
    context::RunContext,
    driver::DriverBuilder,
    environment::{Adb, DeviceEnvironment, DeviceOptions, Dx, HostEnvironment, JarTool},
    expectations::ExpectationStore,
    finder::default_finders,
    launcher::{DalvikLauncher, JvmLauncher},
    mode::Mode,
    reporter::ReporterBuilder,
};
use std::{io::BufWriter, sync::Arc, time::Duration};
use tracing::{debug, info};

/// Runs Java tests on a host JVM or on an attached device, and checks each result against its
/// expectation.
///
/// Test paths may be Java source files or directories. JUnit tests, Caliper benchmarks, jtreg
/// tests and classes with a `main` method are found automatically.
#[derive(Debug, Parser)]
#[command(
    version,
    name = "dalvikrunner",
    bin_name = "dalvikrunner",
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct DalvikRunnerApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    run_opts: RunOpts,

    /// Java source files or directories to search for tests
    #[arg(required = true, value_name = "TEST_PATHS")]
    test_paths: Vec<Utf8PathBuf>,
}

impl DalvikRunnerApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let cwd = current_dir_utf8()?;
        let config = self.config_opts.make_config(&cwd)?;

        let expectations = ExpectationStore::load(&self.run_opts.expectations)?;
        debug!("loaded {} expectations", expectations.len());

        let context = RunContext::new(self.run_opts.no_clean)
            .map_err(|err| ExpectedError::TempDirCreateError { err })?;
        let mode = self.run_opts.make_mode(Arc::new(context), &config);

        let mut builder = DriverBuilder::from_config(&config.run);
        if let Some(build_threads) = self.run_opts.build_threads {
            builder.set_build_threads(build_threads);
        }
        let driver = builder.build(mode, expectations, default_finders(&config.runners))?;

        let mut reporter_builder = ReporterBuilder::default();
        reporter_builder
            .set_colorize(output.color.should_colorize(supports_color::Stream::Stdout))
            .set_verbose(output.verbose)
            .set_xml_reports_dir(self.run_opts.xml_reports_directory.clone());
        let mut reporter = reporter_builder.build(BufWriter::new(std::io::stdout()));

        let run_stats = driver.run(&self.test_paths, &mut reporter)?;
        if self.run_opts.fail_on_unexpected && !run_stats.is_success() {
            return Err(ExpectedError::test_run_failed(run_stats.failed));
        }
        Ok(DalvikRunnerExitCode::OK)
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: .config/dalvik-runner.toml in the current directory]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, cwd: &Utf8Path) -> Result<DalvikRunnerConfig> {
        Ok(DalvikRunnerConfig::from_sources(
            cwd,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Run options")]
struct RunOpts {
    /// Run tests on the host JVM from this JDK instead of on a device
    #[arg(long, value_name = "DIR")]
    java_home: Option<Utf8PathBuf>,

    /// Expectations file; may be passed more than once, later files take precedence
    #[arg(long = "expectations", value_name = "FILE")]
    expectations: Vec<Utf8PathBuf>,

    /// Per-test timeout in seconds [default: from config, 600]
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Suspend each test VM until a debugger attaches on this port
    #[arg(long = "debug", value_name = "PORT")]
    debug_port: Option<u16>,

    /// Working directory on the device [default: from config, /sdcard/dalvikrunner]
    #[arg(long, value_name = "DIR")]
    device_runner_dir: Option<String>,

    /// Compile tests against this SDK jar instead of the JDK's boot classpath
    #[arg(long, value_name = "JAR")]
    sdk_jar: Option<Utf8PathBuf>,

    /// Keep temporary and staged files after the run
    #[arg(long)]
    no_clean: bool,

    /// Write a JUnit XML report into this directory
    #[arg(long, value_name = "DIR")]
    xml_reports_directory: Option<Utf8PathBuf>,

    /// Number of tests to build at once [default: number of logical CPUs]
    #[arg(long, short = 'j', value_name = "THREADS")]
    build_threads: Option<usize>,

    /// Exit with code 100 if any test didn't match its expectation
    #[arg(long)]
    fail_on_unexpected: bool,
}

impl RunOpts {
    fn make_mode(&self, context: Arc<RunContext>, config: &DalvikRunnerConfig) -> Mode {
        let timeout = self
            .timeout
            .map_or(config.run.timeout, Duration::from_secs);

        let mode = match &self.java_home {
            Some(java_home) => {
                let (java, javac) = config.host.resolve(Some(java_home.as_path()));
                info!("running tests on the host with `{java}`");
                let mut compiler = Javac::new(javac);
                if let Some(sdk_jar) = &self.sdk_jar {
                    compiler = compiler.boot_classpath(sdk_jar.clone());
                }
                let run_dir = context.host_run_dir();
                Mode::new(
                    context,
                    compiler,
                    HostEnvironment::new(run_dir, !self.no_clean),
                    JvmLauncher::new(java).debug_port(self.debug_port),
                )
            }
            None => {
                let (_, javac) = config.host.resolve(None);
                let mut compiler = Javac::new(javac);
                if let Some(sdk_jar) = &self.sdk_jar {
                    compiler = compiler.boot_classpath(sdk_jar.clone());
                }

                let mut options = DeviceOptions::from_config(&config.device);
                if let Some(runner_dir) = &self.device_runner_dir {
                    options.runner_dir = runner_dir.clone();
                }
                if self.no_clean {
                    options.clean_after = false;
                }
                options.debug_port = self.debug_port;
                info!("running tests on the device in `{}`", options.runner_dir);

                let adb = Adb::new(config.device.adb.clone());
                let staging_dir = context.device_staging_dir();
                let environment = DeviceEnvironment::new(
                    adb.clone(),
                    Dx::new(config.device.dx.clone()),
                    JarTool::new(config.device.jar.clone()),
                    staging_dir,
                    options,
                );
                Mode::new(
                    context,
                    compiler,
                    environment,
                    DalvikLauncher::new(adb).debug_port(self.debug_port),
                )
            }
        };

        mode.timeout(timeout)
            .test_classpath(config.runners.test_classpath())
    }
}

fn current_dir_utf8() -> Result<Utf8PathBuf> {
    let cwd =
        std::env::current_dir().map_err(|err| ExpectedError::GetCurrentDirFailed { err })?;
    Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}
