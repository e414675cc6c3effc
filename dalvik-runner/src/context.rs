// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run state shared by every stage of the pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::io;
use tracing::info;

/// State for a single run: the temporary directory everything is built in.
///
/// The temporary directory is removed when the context is dropped, unless files are kept. A
/// [`Mode`](crate::mode::Mode) holds the context behind an `Arc`, so the directory outlives any
/// build still in flight.
#[derive(Debug)]
pub struct RunContext {
    temp_root: Utf8PathBuf,
    // None if the directory is kept after the run.
    _temp_dir: Option<Utf8TempDir>,
}

impl RunContext {
    /// Creates a context with a fresh temporary directory in the system temp dir.
    pub fn new(keep_files: bool) -> io::Result<Self> {
        let temp_dir = camino_tempfile::Builder::new()
            .prefix("dalvikrunner-")
            .tempdir()?;
        Ok(Self::from_temp_dir(temp_dir, keep_files))
    }

    /// Creates a context with a fresh temporary directory inside `parent`.
    pub fn new_in(parent: &Utf8Path, keep_files: bool) -> io::Result<Self> {
        let temp_dir = camino_tempfile::Builder::new()
            .prefix("dalvikrunner-")
            .tempdir_in(parent)?;
        Ok(Self::from_temp_dir(temp_dir, keep_files))
    }

    fn from_temp_dir(temp_dir: Utf8TempDir, keep_files: bool) -> Self {
        let temp_root = temp_dir.path().to_owned();
        let temp_dir = if keep_files {
            info!("keeping temporary files in {temp_root}");
            let _ = temp_dir.keep();
            None
        } else {
            Some(temp_dir)
        };

        Self {
            temp_root,
            _temp_dir: temp_dir,
        }
    }

    /// The root of this run's temporary directory.
    pub fn temp_root(&self) -> &Utf8Path {
        &self.temp_root
    }

    /// Where harness sources are written.
    pub fn harness_sources_dir(&self) -> Utf8PathBuf {
        self.temp_root.join("harness/src")
    }

    /// Where the harness is compiled to.
    pub fn harness_classes_dir(&self) -> Utf8PathBuf {
        self.temp_root.join("harness/classes")
    }

    /// Where a test is compiled to. Also holds its `test.properties`.
    pub fn test_classes_dir(&self, qualified_name: &str) -> Utf8PathBuf {
        let mut dir = self.temp_root.join("tests");
        dir.push(qualified_name);
        dir.push("classes");
        dir
    }

    /// Where the host environment stages tests.
    pub fn host_run_dir(&self) -> Utf8PathBuf {
        self.temp_root.join("run")
    }

    /// Where the device environment writes dexed jars before pushing them.
    pub fn device_staging_dir(&self) -> Utf8PathBuf {
        self.temp_root.join("device")
    }
}
