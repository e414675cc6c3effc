// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable console output for test events.

use super::events::{RunStats, TestEvent};
use crate::{
    helpers::{format_duration_secs, plural},
    test_run::TestRun,
};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

#[derive(Debug, Default)]
pub(super) struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    fail_output: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.fail_output = Style::new().magenta();
    }
}

/// Writes one line per finished test, and a summary at the end of the run.
#[derive(Debug)]
pub(super) struct Displayer {
    styles: Styles,
    verbose: bool,
}

impl Displayer {
    pub(super) fn new(styles: Styles, verbose: bool) -> Self {
        Self { styles, verbose }
    }

    pub(super) fn write_event(
        &self,
        event: &TestEvent<'_>,
        mut writer: impl Write,
    ) -> io::Result<()> {
        match event {
            TestEvent::RunStarted { test_count } => {
                writeln!(
                    writer,
                    "Running {} {}",
                    test_count.style(self.styles.count),
                    plural::tests_str(*test_count),
                )?;
            }
            TestEvent::TestSkipped { .. } => {
                // Skipped tests are only counted in the summary.
            }
            TestEvent::TestFinished { test_run, matched } => {
                self.write_finished(test_run, *matched, &mut writer)?;
            }
            TestEvent::RunFinished {
                elapsed, run_stats, ..
            } => {
                self.write_summary(*elapsed, run_stats, &mut writer)?;
            }
        }
        Ok(())
    }

    fn write_finished(
        &self,
        test_run: &TestRun,
        matched: bool,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let result = test_run
            .result()
            .map_or("(no result)", |result| result.as_str());
        if matched {
            write!(writer, "{:<4} ", "OK".style(self.styles.pass))?;
        } else {
            write!(writer, "{:<4} ", "FAIL".style(self.styles.fail))?;
        }
        writeln!(writer, "{} ({result})", test_run.qualified_name())?;

        if !matched {
            if let Some(description) = test_run.description() {
                writeln!(writer, "  {description}")?;
            }
            let expected = test_run.expected();
            writeln!(writer, "  expected {}", expected.result())?;
        }

        if !matched || self.verbose {
            let output_style = if matched {
                Style::new()
            } else {
                self.styles.fail_output
            };
            if let Some(outcome) = test_run.outcome() {
                for line in outcome.output() {
                    writeln!(writer, "    {}", line.style(output_style))?;
                }
            }
        }

        Ok(())
    }

    fn write_summary(
        &self,
        elapsed: std::time::Duration,
        run_stats: &RunStats,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let RunStats {
            initial_count,
            finished,
            passed,
            failed,
            unsupported,
        } = *run_stats;

        writeln!(
            writer,
            "Skipped {} unsupported {}",
            unsupported.style(self.styles.skip),
            plural::tests_str(unsupported),
        )?;

        let summary_style = if run_stats.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        write!(
            writer,
            "{} [{}] ",
            "Summary".style(summary_style),
            format_duration_secs(elapsed),
        )?;
        write!(writer, "{}", finished.style(self.styles.count))?;
        if !run_stats.is_complete() {
            write!(
                writer,
                "/{}",
                (initial_count - unsupported).style(self.styles.count)
            )?;
        }
        writeln!(
            writer,
            " {} run: {} {}, {} {}, {} skipped",
            plural::tests_str(finished),
            passed.style(self.styles.count),
            "passed".style(self.styles.pass),
            failed.style(self.styles.count),
            "failed".style(self.styles.fail),
            unsupported.style(self.styles.count),
        )?;

        Ok(())
    }
}
