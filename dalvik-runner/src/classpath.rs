// Copyright (c) The DalvikRunner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An ordered, deduplicated list of classpath entries.

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use std::fmt;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// The separator between classpath entries on this platform.
        pub const PATH_SEPARATOR: char = ';';
    } else {
        /// The separator between classpath entries on this platform.
        pub const PATH_SEPARATOR: char = ':';
    }
}

/// An ordered set of classpath entries.
///
/// Insertion order is preserved since it determines class resolution order. Adding an entry that
/// is already present has no effect. Entries are not checked for existence.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classpath {
    entries: IndexSet<Utf8PathBuf>,
}

impl Classpath {
    /// Creates an empty classpath.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classpath from the given entries, in order.
    pub fn of(entries: impl IntoIterator<Item = impl Into<Utf8PathBuf>>) -> Self {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a classpath string on the platform separator.
    ///
    /// Empty segments are ignored.
    pub fn split(classpath: &str) -> Self {
        Self::of(
            classpath
                .split(PATH_SEPARATOR)
                .filter(|entry| !entry.is_empty()),
        )
    }

    /// Appends an entry if it isn't already present.
    pub fn add(&mut self, entry: impl Into<Utf8PathBuf>) -> &mut Self {
        self.entries.insert(entry.into());
        self
    }

    /// Appends all entries of another classpath, preserving their order.
    pub fn add_all(&mut self, other: &Classpath) -> &mut Self {
        self.entries.extend(other.entries.iter().cloned());
        self
    }

    /// Returns true if the classpath contains the given entry.
    pub fn contains(&self, entry: impl AsRef<Utf8Path>) -> bool {
        self.entries.contains(entry.as_ref())
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Utf8Path> + '_ {
        self.entries.iter().map(|entry| entry.as_path())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.entries.iter().enumerate() {
            if idx > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl<P: Into<Utf8PathBuf>> FromIterator<P> for Classpath {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl<P: Into<Utf8PathBuf>> Extend<P> for Classpath {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        self.entries.extend(iter.into_iter().map(Into::into));
    }
}
