// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Environment, StageRequest, StagedTest};
use crate::{classpath::Classpath, errors::EnvironmentError, test_run::TestRun};
use camino::{Utf8Path, Utf8PathBuf};
use cp_r::CopyOptions;
use std::{fs, io};
use tracing::debug;

/// Stages tests into local directories for a host JVM.
///
/// Each test is copied into `<run_dir>/<qualified-name>`, which also serves as its working
/// directory.
#[derive(Clone, Debug)]
pub struct HostEnvironment {
    run_dir: Utf8PathBuf,
    clean: bool,
}

impl HostEnvironment {
    /// Creates a new host environment staging into `run_dir`.
    ///
    /// If `clean` is false, staged tests are left in place after they run.
    pub fn new(run_dir: impl Into<Utf8PathBuf>, clean: bool) -> Self {
        Self {
            run_dir: run_dir.into(),
            clean,
        }
    }

    /// Returns the directory a test is staged into.
    pub fn test_dir(&self, test_run: &TestRun) -> Utf8PathBuf {
        self.run_dir.join(test_run.qualified_name())
    }
}

impl Environment for HostEnvironment {
    fn prepare(&self, harness_classes: &Utf8Path) -> Result<Classpath, EnvironmentError> {
        fs::create_dir_all(&self.run_dir).map_err(|error| EnvironmentError::Fs {
            path: self.run_dir.clone(),
            error,
        })?;
        Ok(Classpath::of([harness_classes]))
    }

    fn stage(&self, request: &StageRequest<'_>) -> Result<StagedTest, EnvironmentError> {
        let test_dir = self.test_dir(request.test_run);

        // Creating the directory doubles as the existence check.
        fs::create_dir(&test_dir).map_err(|error| {
            if error.kind() == io::ErrorKind::AlreadyExists {
                EnvironmentError::AlreadyExists {
                    path: test_dir.clone(),
                }
            } else {
                EnvironmentError::Fs {
                    path: test_dir.clone(),
                    error,
                }
            }
        })?;

        CopyOptions::new()
            .copy_tree(request.classes_dir, &test_dir)
            .map_err(|error| EnvironmentError::Copy {
                from: request.classes_dir.to_owned(),
                to: test_dir.clone(),
                error,
            })?;
        debug!(from = %request.classes_dir, to = %test_dir, "staged test");

        let mut classpath = Classpath::of([&test_dir]);
        classpath.add_all(request.classpath);
        Ok(StagedTest::new(classpath, test_dir))
    }

    fn cleanup(&self, test_run: &TestRun) -> Result<(), EnvironmentError> {
        if !self.clean {
            return Ok(());
        }
        let test_dir = self.test_dir(test_run);
        match fs::remove_dir_all(&test_dir) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(EnvironmentError::Fs {
                path: test_dir,
                error,
            }),
        }
    }

    fn shutdown(&self) -> Result<(), EnvironmentError> {
        // The run directory lives under the run context's temp root, which owns its removal.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_run::test_helpers::make_run;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn classes_dir(root: &Utf8Path) -> Utf8PathBuf {
        let classes = root.join("classes");
        fs::create_dir_all(classes.join("p")).unwrap();
        fs::write(classes.join("p/Foo.class"), b"\xca\xfe\xba\xbe").unwrap();
        fs::write(classes.join("test.properties"), "testClass=p.Foo\n").unwrap();
        classes
    }

    #[test]
    fn stage_copies_classes() {
        let temp = Utf8TempDir::new().expect("created temp dir");
        let classes = classes_dir(temp.path());
        let env = HostEnvironment::new(temp.path().join("run"), true);
        let harness = env
            .prepare(&temp.path().join("harness"))
            .expect("prepared");
        assert!(harness.contains(temp.path().join("harness")));

        let run = make_run("p.Foo");
        let extra = Classpath::of(["/opt/junit.jar"]);
        let staged = env
            .stage(&StageRequest {
                test_run: &run,
                classes_dir: &classes,
                classpath: &extra,
            })
            .expect("staged");

        let test_dir = temp.path().join("run/p.Foo");
        assert_eq!(staged.user_dir(), test_dir.as_path());
        assert_eq!(
            staged.classpath(),
            &Classpath::of([test_dir.as_path(), Utf8Path::new("/opt/junit.jar")])
        );
        assert!(test_dir.join("p/Foo.class").is_file());
        assert!(test_dir.join("test.properties").is_file());

        env.cleanup(&run).expect("cleaned up");
        assert!(!test_dir.exists(), "test dir removed");
        env.cleanup(&run).expect("cleanup is idempotent");
    }

    #[test]
    fn stage_fails_if_destination_exists() {
        let temp = Utf8TempDir::new().expect("created temp dir");
        let classes = classes_dir(temp.path());
        let env = HostEnvironment::new(temp.path().join("run"), true);
        env.prepare(&temp.path().join("harness")).expect("prepared");

        let run = make_run("p.Foo");
        fs::create_dir(env.test_dir(&run)).unwrap();
        let err = env
            .stage(&StageRequest {
                test_run: &run,
                classes_dir: &classes,
                classpath: &Classpath::new(),
            })
            .expect_err("existing destination is rejected");
        assert!(
            matches!(err, EnvironmentError::AlreadyExists { .. }),
            "got {err}"
        );
    }

    #[test]
    fn no_clean_keeps_files() {
        let temp = Utf8TempDir::new().expect("created temp dir");
        let classes = classes_dir(temp.path());
        let env = HostEnvironment::new(temp.path().join("run"), false);
        env.prepare(&temp.path().join("harness")).expect("prepared");

        let run = make_run("p.Foo");
        env.stage(&StageRequest {
            test_run: &run,
            classes_dir: &classes,
            classpath: &Classpath::new(),
        })
        .expect("staged");
        env.cleanup(&run).expect("cleanup succeeds");
        assert!(env.test_dir(&run).is_dir(), "test dir kept");
    }
}
