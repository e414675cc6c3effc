// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core orchestration logic for DalvikRunner.
//!
//! DalvikRunner discovers Java tests, compiles them, stages them into an execution environment
//! (a host JVM working directory or a device reachable over `adb`), runs them one at a time and
//! compares each outcome against a table of expectations.
//!
//! The pipeline is driven by [`driver::Driver`], which builds tests concurrently and executes them
//! serially through a [`mode::Mode`].

pub mod classpath;
pub mod command;
pub mod compiler;
pub mod config;
pub mod context;
pub mod driver;
pub mod environment;
pub mod errors;
pub mod expectations;
pub mod finder;
pub mod harness;
mod helpers;
pub mod launcher;
pub mod mode;
pub mod reporter;
pub mod test_run;
mod time;
