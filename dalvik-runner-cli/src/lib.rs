// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `dalvikrunner` command-line interface.
//!
//! This crate has no stable library API; use the `dalvik-runner` crate instead.

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
