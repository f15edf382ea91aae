use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const REPODATA_VERSION: u32 = 1;
pub const CHANNELDATA_VERSION: u32 = 1;

/// A `repodata.json`/`repodata_from_packages.json` document for one
/// `(subdir, label)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoDataDocument {
    pub repodata_version: u32,
    pub info: RepoDataInfo,
    pub packages: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "packages.conda", default)]
    pub packages_conda: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RepoDataInfo {
    pub subdir: String,
}

impl RepoDataDocument {
    pub fn new(subdir: impl Into<String>) -> RepoDataDocument {
        RepoDataDocument {
            repodata_version: REPODATA_VERSION,
            info: RepoDataInfo { subdir: subdir.into() },
            packages: BTreeMap::new(),
            packages_conda: BTreeMap::new(),
            removed: Vec::new(),
        }
    }

    pub fn all_package_names(&self) -> impl Iterator<Item = &String> {
        self.packages.keys().chain(self.packages_conda.keys())
    }
}

/// A `channeldata.json` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelDataDocument {
    pub channeldata_version: u32,
    pub subdirs: Vec<String>,
    pub packages: BTreeMap<String, serde_json::Value>,
}

impl ChannelDataDocument {
    pub fn new() -> ChannelDataDocument {
        ChannelDataDocument {
            channeldata_version: CHANNELDATA_VERSION,
            subdirs: Vec::new(),
            packages: BTreeMap::new(),
        }
    }
}

impl Default for ChannelDataDocument {
    fn default() -> Self {
        ChannelDataDocument::new()
    }
}

/// Normalizes a timestamp that may have been recorded in milliseconds
/// instead of seconds: anything past `253_402_300_799` (year 9999 in
/// seconds) is assumed to actually be milliseconds.
pub fn normalize_timestamp_seconds(ts: i64) -> i64 {
    if ts > 253_402_300_799 {
        ts / 1000
    } else {
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millisecond_timestamps_are_corrected() {
        assert_eq!(normalize_timestamp_seconds(1_700_000_000_000), 1_700_000_000);
    }

    #[test]
    fn second_timestamps_pass_through() {
        assert_eq!(normalize_timestamp_seconds(1_700_000_000), 1_700_000_000);
    }
}
