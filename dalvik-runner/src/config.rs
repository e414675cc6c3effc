// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for DalvikRunner.
//!
//! The embedded default config is layered under an optional user config file.

use crate::{classpath::Classpath, errors::ConfigParseError, test_run::RunnerKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Overall configuration for DalvikRunner.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DalvikRunnerConfig {
    /// Pipeline settings.
    pub run: RunConfig,

    /// Settings for running tests on a host JVM.
    pub host: HostConfig,

    /// Settings for running tests on a device.
    pub device: DeviceConfig,

    /// Classpaths for test runners.
    pub runners: RunnersConfig,
}

impl DalvikRunnerConfig {
    /// The default location of the config within the base directory.
    pub const CONFIG_PATH: &'static str = ".config/dalvik-runner.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/dalvik-runner.toml`
    /// in `base_dir`.
    ///
    /// An explicitly specified file must exist. If no file is specified and the default location
    /// doesn't exist, the default config is used.
    pub fn from_sources(
        base_dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (base_dir.join(Self::CONFIG_PATH), false),
        };
        debug!(%config_file, required, "reading config");

        Self::make_default_config()
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(required))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(config_file, err))
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        Self::make_default_config()
            .build()
            .and_then(|config| config.try_deserialize())
            .expect("default config is always valid")
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }
}

/// Pipeline settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// The per-test timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// The capacity of the queue of built tests awaiting execution.
    pub ready_queue_capacity: usize,

    /// How long to wait for the next built test before failing the run.
    #[serde(with = "humantime_serde")]
    pub ready_timeout: Duration,

    /// The number of build workers, or `None` for the number of logical CPUs.
    #[serde(default)]
    pub build_threads: Option<usize>,
}

/// Settings for running tests on a host JVM.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostConfig {
    /// The `java` launcher.
    pub java: String,

    /// The `javac` compiler.
    pub javac: String,
}

impl HostConfig {
    /// Resolves the tools against `<java_home>/bin`, if a Java home is given.
    ///
    /// Only bare program names are resolved. Paths are used as-is.
    pub fn resolve(&self, java_home: Option<&Utf8Path>) -> (String, String) {
        let resolve = |program: &str| match java_home {
            Some(home) if !program.contains(['/', '\\']) => {
                home.join("bin").join(program).into_string()
            }
            _ => program.to_owned(),
        };
        (resolve(&self.java), resolve(&self.javac))
    }
}

/// Settings for running tests on a device.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    /// The device bridge.
    pub adb: String,

    /// The dex tool.
    pub dx: String,

    /// The jar tool.
    pub jar: String,

    /// The working directory on the device.
    pub runner_dir: String,

    /// How long to wait for the device's storage to become available.
    #[serde(with = "humantime_serde")]
    pub device_wait_timeout: Duration,

    /// How often to check whether the device's storage is available.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Whether to remove the device working directory before the run.
    pub clean_before: bool,

    /// Whether to remove test files from the device after the run.
    pub clean_after: bool,
}

/// Classpaths for test runners.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnersConfig {
    /// Entries needed by JUnit tests.
    pub junit_classpath: Vec<Utf8PathBuf>,

    /// Entries needed by Caliper benchmarks.
    pub caliper_classpath: Vec<Utf8PathBuf>,

    /// Entries needed by jtreg tests.
    pub jtreg_classpath: Vec<Utf8PathBuf>,

    /// Entries shared by every test.
    pub test_classpath: Vec<Utf8PathBuf>,
}

impl RunnersConfig {
    /// Returns the classpath needed by the given runner kind.
    pub fn runner_classpath(&self, kind: RunnerKind) -> Classpath {
        match kind {
            RunnerKind::Jtreg => Classpath::of(self.jtreg_classpath.iter().cloned()),
            RunnerKind::JUnit => Classpath::of(self.junit_classpath.iter().cloned()),
            RunnerKind::Caliper => Classpath::of(self.caliper_classpath.iter().cloned()),
            RunnerKind::Main => Classpath::new(),
        }
    }

    /// Returns the classpath shared by every test.
    pub fn test_classpath(&self) -> Classpath {
        Classpath::of(self.test_classpath.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let config = DalvikRunnerConfig::default_config();
        assert_eq!(config.run.timeout, Duration::from_secs(600));
        assert_eq!(config.run.ready_queue_capacity, 4);
        assert_eq!(config.run.ready_timeout, Duration::from_secs(300));
        assert_eq!(config.run.build_threads, None);
        assert_eq!(config.device.runner_dir, "/sdcard/dalvikrunner");
        assert_eq!(config.device.poll_interval, Duration::from_secs(2));
        assert!(config.device.clean_before);
        assert!(config.device.clean_after);
        assert!(config.runners.test_classpath().is_empty());
    }

    #[test]
    fn user_config_overrides_defaults() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config_dir = dir.path().join(".config");
        std::fs::create_dir(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("dalvik-runner.toml"),
            indoc! {r#"
                [run]
                timeout = "30s"
                build-threads = 2

                [device]
                clean-after = false

                [runners]
                junit-classpath = ["/opt/junit.jar", "/opt/hamcrest.jar"]
            "#},
        )
        .unwrap();

        let config =
            DalvikRunnerConfig::from_sources(dir.path(), None).expect("config is valid");
        assert_eq!(config.run.timeout, Duration::from_secs(30));
        assert_eq!(config.run.build_threads, Some(2));
        assert_eq!(config.run.ready_queue_capacity, 4, "default kept");
        assert!(!config.device.clean_after);
        assert!(config.device.clean_before, "default kept");

        let junit = config.runners.runner_classpath(RunnerKind::JUnit);
        assert_eq!(
            junit.iter().map(|entry| entry.as_str()).collect::<Vec<_>>(),
            ["/opt/junit.jar", "/opt/hamcrest.jar"]
        );
        assert!(config.runners.runner_classpath(RunnerKind::Main).is_empty());
    }

    #[test]
    fn missing_default_location_uses_defaults() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config =
            DalvikRunnerConfig::from_sources(dir.path(), None).expect("defaults are used");
        assert_eq!(config.host.java, "java");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let missing = dir.path().join("missing.toml");
        DalvikRunnerConfig::from_sources(dir.path(), Some(&missing))
            .expect_err("explicit config file must exist");
    }

    #[test]
    fn invalid_value_is_an_error() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "[run]\ntimeout = \"soon\"\n").unwrap();
        DalvikRunnerConfig::from_sources(dir.path(), Some(&file))
            .expect_err("invalid duration is rejected");
    }

    #[test]
    fn host_tools_resolve_against_java_home() {
        let host = DalvikRunnerConfig::default_config().host;
        assert_eq!(host.resolve(None), ("java".to_owned(), "javac".to_owned()));

        let (java, javac) = host.resolve(Some(Utf8Path::new("/usr/lib/jvm/jdk")));
        let bin = Utf8Path::new("/usr/lib/jvm/jdk").join("bin");
        assert_eq!(java, bin.join("java").into_string());
        assert_eq!(javac, bin.join("javac").into_string());
    }
}
