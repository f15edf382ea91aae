use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque revision pointers recorded in the Link Table so the next Worker
/// Loop iteration can compute an incremental diff instead of a full walk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrentShas {
    pub shard_store: Option<String>,
    pub patch_set: Option<String>,
}

/// The published lookup table the Redirect Frontend serves from.
///
/// `serverdata` maps an artifact filename to the ordered list of release-
/// asset URLs it has ever been published under (newest last, capped at
/// three); `packages` maps a `subdir/package` key to the upstream URL the
/// package itself should redirect to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LinkTable {
    pub packages: HashMap<String, String>,
    pub serverdata: HashMap<String, Vec<String>>,
    #[serde(rename = "current-shas")]
    pub current_shas: CurrentShas,
    pub labels: Vec<String>,
    pub updated_at: String,
}

/// Published URLs retained per filename; older entries are dropped once a
/// fourth is recorded, per spec.md §8's `|serverdata[fn]| ≤ 3` invariant.
const MAX_RETAINED_URLS: usize = 3;

impl LinkTable {
    pub fn new() -> LinkTable {
        LinkTable::default()
    }

    pub fn record_artifact(&mut self, filename: impl Into<String>, url: impl Into<String>) {
        let urls = self.serverdata.entry(filename.into()).or_default();
        urls.push(url.into());
        if urls.len() > MAX_RETAINED_URLS {
            let drop = urls.len() - MAX_RETAINED_URLS;
            urls.drain(..drop);
        }
    }

    pub fn latest_artifact_url(&self, filename: &str) -> Option<&str> {
        self.serverdata.get(filename).and_then(|urls| urls.last()).map(String::as_str)
    }

    pub fn record_package(&mut self, subdir_pkg: impl Into<String>, url: impl Into<String>) {
        self.packages.insert(subdir_pkg.into(), url.into());
    }

    pub fn package_url(&self, subdir_pkg: &str) -> Option<&str> {
        self.packages.get(subdir_pkg).map(String::as_str)
    }

    pub fn record_label(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
            self.labels.sort();
        }
    }

    /// Tags (substrings of any recorded artifact URL) still referenced by
    /// this table. Used by the Release Store's GC sweep to decide which
    /// releases are safe to delete.
    pub fn referenced_tags<'a>(&'a self, candidate_tags: &[&'a str]) -> Vec<&'a str> {
        candidate_tags
            .iter()
            .copied()
            .filter(|tag| {
                self.serverdata
                    .values()
                    .flatten()
                    .any(|url| url.contains(tag))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_is_last_recorded() {
        let mut t = LinkTable::new();
        t.record_artifact("repodata.json", "https://example/v1/repodata.json");
        t.record_artifact("repodata.json", "https://example/v2/repodata.json");
        assert_eq!(t.latest_artifact_url("repodata.json"), Some("https://example/v2/repodata.json"));
    }

    #[test]
    fn gc_keeps_referenced_tags_only() {
        let mut t = LinkTable::new();
        t.record_artifact("repodata.json", "https://example/v2/repodata.json");
        let kept = t.referenced_tags(&["v1", "v2"]);
        assert_eq!(kept, vec!["v2"]);
    }

    #[test]
    fn serverdata_retains_at_most_three_urls() {
        let mut t = LinkTable::new();
        for i in 0..5 {
            t.record_artifact("repodata.json", format!("https://example/v{i}/repodata.json"));
        }
        let urls = &t.serverdata["repodata.json"];
        assert_eq!(urls.len(), 3);
        assert_eq!(urls.last().unwrap(), "https://example/v4/repodata.json");
    }

    #[test]
    fn record_label_keeps_sorted_unique_set() {
        let mut t = LinkTable::new();
        t.record_label("main");
        t.record_label("dev");
        t.record_label("main");
        assert_eq!(t.labels, vec!["dev".to_string(), "main".to_string()]);
    }
}
