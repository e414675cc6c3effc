// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting of test events: console output and JUnit XML.
//!
//! The main structure in this module is [`TestReporter`].

mod displayer;
mod events;
mod junit;

pub use events::*;
pub use junit::REPORT_NAME;

use crate::errors::WriteEventError;
use camino::Utf8PathBuf;
use displayer::{Displayer, Styles};
use junit::JunitReporter;
use std::io::Write;

/// Receives test events from the driver, in execution order.
pub trait Reporter {
    /// Reports a single event.
    fn report_event(&mut self, event: &TestEvent<'_>) -> Result<(), WriteEventError>;
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report_event(&mut self, event: &TestEvent<'_>) -> Result<(), WriteEventError> {
        (**self).report_event(event)
    }
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    verbose: bool,
    xml_reports_dir: Option<Utf8PathBuf>,
}

impl ReporterBuilder {
    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets verbose output: the output of every test is shown, not just failing ones.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Writes a JUnit XML report into this directory at the end of the run.
    pub fn set_xml_reports_dir(&mut self, dir: Option<Utf8PathBuf>) -> &mut Self {
        self.xml_reports_dir = dir;
        self
    }

    /// Creates a new test reporter writing to `output`.
    pub fn build<W: Write>(&self, output: W) -> TestReporter<W> {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }

        TestReporter {
            output,
            displayer: Displayer::new(styles, self.verbose),
            junit: self.xml_reports_dir.as_deref().map(JunitReporter::new),
        }
    }
}

/// Functionality to report test results to the console, and optionally to JUnit XML.
#[derive(Debug)]
pub struct TestReporter<W> {
    output: W,
    displayer: Displayer,
    junit: Option<JunitReporter>,
}

impl<W: Write> Reporter for TestReporter<W> {
    fn report_event(&mut self, event: &TestEvent<'_>) -> Result<(), WriteEventError> {
        self.displayer
            .write_event(event, &mut self.output)
            .and_then(|()| self.output.flush())
            .map_err(WriteEventError::Io)?;
        if let Some(junit) = &mut self.junit {
            junit.write_event(event)?;
        }
        Ok(())
    }
}
