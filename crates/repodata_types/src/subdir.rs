use serde::{Deserialize, Serialize};
use std::fmt;

/// An architecture bucket, e.g. `linux-64`, `osx-arm64`, `noarch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Subdir(String);

impl Subdir {
    pub fn new(s: impl Into<String>) -> Subdir {
        Subdir(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subdir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subdir {
    fn from(s: &str) -> Self {
        Subdir::new(s)
    }
}

/// A channel-overlay label. `"main"` is the default, unlabeled channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub const MAIN: &'static str = "main";

    pub fn new(s: impl Into<String>) -> Label {
        Label(s.into())
    }

    pub fn main() -> Label {
        Label::new(Label::MAIN)
    }

    pub fn is_main(&self) -> bool {
        self.0 == Label::MAIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::new(s)
    }
}

/// The fixed, ordered list of subdirs this pipeline mirrors. Ordering
/// matters: rank partitioning mods over this list's index, and the order
/// is chosen so that `index % 4` spreads the largest subdirs across
/// distinct ranks.
pub const CONDA_FORGE_SUBDIRS: &[&str] = &[
    "noarch",
    "linux-64",
    "osx-64",
    "win-64",
    "linux-aarch64",
    "linux-ppc64le",
    "osx-arm64",
    "win-arm64",
    "linux-armv7l",
    "linux-s390x",
];
