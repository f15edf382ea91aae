use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Package names excluded from ordinary publication or indexing, sourced
/// from an external, periodically-refreshed list rather than hardcoded.
#[derive(Debug, Clone, Default)]
pub struct PackageDenylist {
    unindexable: BTreeSet<String>,
    undistributable: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct DenylistFile {
    #[serde(default)]
    unindexable: BTreeSet<String>,
    #[serde(default)]
    undistributable: BTreeSet<String>,
}

impl PackageDenylist {
    pub fn new(unindexable: BTreeSet<String>, undistributable: BTreeSet<String>) -> Self {
        PackageDenylist { unindexable, undistributable }
    }

    /// Loads `{"unindexable": [...], "undistributable": [...]}` from disk,
    /// mirroring `metadata.py`'s `metadata.json` bundle.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = std::fs::read(path)?;
        let parsed: DenylistFile = serde_json::from_slice(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(PackageDenylist::new(parsed.unindexable, parsed.undistributable))
    }

    pub fn is_unindexable(&self, subdir_pkg: &str) -> bool {
        self.unindexable.contains(subdir_pkg)
    }

    pub fn is_undistributable(&self, package_name: &str) -> bool {
        self.undistributable.contains(package_name)
    }

    /// A short hash of the undistributable set, recorded on a shard once
    /// it has been swept so the sweep is idempotent against an unchanged
    /// list.
    pub fn undistributable_hash(&self) -> String {
        let joined: String = self.undistributable.iter().cloned().collect();
        let digest = Sha256::digest(joined.as_bytes());
        hex::encode(digest)[..6].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_under_reordering() {
        let a = PackageDenylist::new(
            BTreeSet::new(),
            BTreeSet::from(["a".to_string(), "b".to_string()]),
        );
        let b = PackageDenylist::new(
            BTreeSet::new(),
            BTreeSet::from(["b".to_string(), "a".to_string()]),
        );
        assert_eq!(a.undistributable_hash(), b.undistributable_hash());
    }

    #[test]
    fn loads_from_json_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("denylist-test-{:?}.json", std::thread::current().id()));
        std::fs::write(&path, r#"{"unindexable": ["linux-64/bad.tar.bz2"], "undistributable": ["nvidia-smi"]}"#).unwrap();

        let denylist = PackageDenylist::from_file(&path).unwrap();
        assert!(denylist.is_unindexable("linux-64/bad.tar.bz2"));
        assert!(denylist.is_undistributable("nvidia-smi"));

        std::fs::remove_file(&path).ok();
    }
}
