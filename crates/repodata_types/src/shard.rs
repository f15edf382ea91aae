use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::{Label, Subdir};

/// A single package's metadata, keyed by `(subdir, package filename)`.
///
/// One shard is the atomic unit the Shard Store persists: a package's
/// repodata record plus its channeldata contribution plus the set of
/// labels it is currently published under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shard {
    pub labels: Vec<Label>,
    pub subdir: Subdir,
    pub package: String,
    pub url: String,
    pub feedstock: Option<String>,
    pub repodata_version: Option<u32>,
    pub repodata: Option<serde_json::Value>,
    pub channeldata_version: Option<u32>,
    pub channeldata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undistributable_hash: Option<String>,
}

impl Shard {
    pub fn null(subdir: Subdir, package: String, label: Label, url: String) -> Shard {
        Shard {
            labels: vec![label],
            subdir,
            package,
            url,
            feedstock: None,
            repodata_version: None,
            repodata: None,
            channeldata_version: None,
            channeldata: None,
            undistributable_hash: None,
        }
    }

    pub fn is_indexable(&self) -> bool {
        self.repodata.is_some()
    }

    pub fn key(&self) -> ShardKey {
        ShardKey::new(&self.subdir, &self.package)
    }
}

/// Canonical on-disk/storage key for a shard: `sha1(package)` hex-digest,
/// prefixed by subdir. The first `n` hex characters become `n` one-char
/// path components beneath `shards/<subdir>/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardKey {
    subdir: Subdir,
    package: String,
    digest_hex: String,
}

impl ShardKey {
    pub fn new(subdir: &Subdir, package: &str) -> ShardKey {
        let mut hasher = Sha1::new();
        hasher.update(package.as_bytes());
        let digest_hex = hex::encode(hasher.finalize());
        ShardKey {
            subdir: subdir.clone(),
            package: package.to_string(),
            digest_hex,
        }
    }

    pub fn subdir(&self) -> &Subdir {
        &self.subdir
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Canonical relative path: `shards/<subdir>/<h0>/<h1>/<h2>/<package>.json`.
    pub fn canonical_path(&self, n_dirs: usize) -> std::path::PathBuf {
        let mut p = std::path::PathBuf::from("shards");
        p.push(self.subdir.as_str());
        for c in self.digest_hex.chars().take(n_dirs) {
            p.push(c.to_string());
        }
        p.push(format!("{}.json", self.package));
        p
    }

    /// Legacy path: one directory per alphanumeric character of the
    /// package filename, padded with `z` to `n_dirs` components.
    pub fn legacy_path(&self, n_dirs: usize) -> std::path::PathBuf {
        let mut chars: Vec<char> = self.package.chars().filter(|c| c.is_alphanumeric()).collect();
        while chars.len() < n_dirs {
            chars.push('z');
        }
        let mut p = std::path::PathBuf::from("shards");
        p.push(self.subdir.as_str());
        for c in chars.into_iter().take(n_dirs) {
            p.push(c.to_string());
        }
        p.push(format!("{}.json", self.package));
        p
    }

    /// Rank a per-package shard key is assigned to, for the shard-level
    /// partitioning layer described alongside [`crate::Label`] rank
    /// partitioning.
    pub fn rank(&self, n_ranks: u32) -> u32 {
        if n_ranks == 0 {
            return 0;
        }
        let mut hasher = Sha1::new();
        hasher.update(self.subdir.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(self.package.as_bytes());
        let digest = hasher.finalize();
        (digest[0] as u32) % n_ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_path_uses_three_hex_dirs() {
        let key = ShardKey::new(&Subdir::new("linux-64"), "numpy-1.0-py38.tar.bz2");
        let path = key.canonical_path(3);
        let components: Vec<_> = path.components().collect();
        assert_eq!(components.len(), 6);
    }

    #[test]
    fn legacy_path_pads_with_z() {
        let key = ShardKey::new(&Subdir::new("noarch"), "a-1.tar.bz2");
        let path = key.legacy_path(12);
        assert!(path.to_string_lossy().contains('z'));
    }

    #[test]
    fn rank_is_stable() {
        let key = ShardKey::new(&Subdir::new("linux-64"), "foo-1.0.tar.bz2");
        assert_eq!(key.rank(4), key.rank(4));
    }
}
