// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the test pipeline.
//!
//! These tests substitute the compiler and launcher with fakes, and run short shell scripts in
//! place of test processes.

#![cfg(unix)]

mod fixtures;
mod pipeline;
