// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for dalvik-runner.

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }
}

/// Formats a duration as seconds with millisecond precision, e.g. `1.250s`.
pub(crate) fn format_duration_secs(duration: std::time::Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}
