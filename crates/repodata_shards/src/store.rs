use std::path::{Path, PathBuf};

use repodata_config::RepoError;
use repodata_types::{Shard, ShardKey, Subdir};

/// A filesystem-backed shard store rooted at a working copy of the shards
/// repository. VCS operations (pull/commit/push) are the caller's concern,
/// modeled separately by [`crate::source_control::SourceControl`]; this
/// type only knows how to find and read/write individual shard files.
pub struct ShardStore {
    root: PathBuf,
    n_dirs: usize,
}

impl ShardStore {
    pub fn new(root: impl Into<PathBuf>) -> ShardStore {
        ShardStore { root: root.into(), n_dirs: 3 }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Resolves a shard's on-disk path, preferring the canonical layout
    /// but falling back to either legacy layout if that's where the shard
    /// actually lives. Returns `None` if the shard doesn't exist under any
    /// known layout.
    pub fn resolve_path(&self, key: &ShardKey) -> Option<PathBuf> {
        let canonical = self.absolute(&key.canonical_path(self.n_dirs));
        if canonical.exists() {
            return Some(canonical);
        }
        let legacy_4 = self.absolute(&key.canonical_path(4));
        if legacy_4.exists() {
            return Some(legacy_4);
        }
        let legacy_old = self.absolute(&key.legacy_path(12));
        if legacy_old.exists() {
            return Some(legacy_old);
        }
        None
    }

    /// Reads a shard, migrating it to the canonical path if it was only
    /// found at a legacy one. The shard store self-heals on read rather
    /// than requiring a separate migration pass.
    pub fn read(&self, key: &ShardKey) -> Result<Option<Shard>, RepoError> {
        match self.resolve_path(key) {
            None => Ok(None),
            Some(path) => {
                let bytes = fs_err::read(&path)?;
                let shard: Shard = serde_json::from_slice(&bytes)?;
                let canonical = self.absolute(&key.canonical_path(self.n_dirs));
                if path != canonical {
                    self.write(&shard)?;
                }
                Ok(Some(shard))
            }
        }
    }

    /// Writes a shard to its canonical path, migrating away from any
    /// legacy path it previously lived at.
    pub fn write(&self, shard: &Shard) -> Result<PathBuf, RepoError> {
        let key = shard.key();
        let canonical = self.absolute(&key.canonical_path(self.n_dirs));
        if let Some(parent) = canonical.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(shard)?;
        fs_err::write(&canonical, body)?;

        for legacy in [self.absolute(&key.canonical_path(4)), self.absolute(&key.legacy_path(12))] {
            if legacy != canonical && legacy.exists() {
                fs_err::remove_file(&legacy)?;
            }
        }
        Ok(canonical)
    }

    /// Lists every shard path present under `subdir`, across all three
    /// known layouts.
    pub fn list_subdir(&self, subdir: &Subdir) -> Result<Vec<PathBuf>, RepoError> {
        let mut out = Vec::new();
        let base = self.absolute(&PathBuf::from("shards").join(subdir.as_str()));
        if base.exists() {
            walk_json_files(&base, &mut out)?;
        }
        Ok(out)
    }
}

fn walk_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RepoError> {
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_json_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodata_types::Label;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let shard = Shard::null(Subdir::new("linux-64"), "foo-1.0.tar.bz2".into(), Label::main(), "https://example/foo".into());
        store.write(&shard).unwrap();

        let key = shard.key();
        let round_tripped = store.read(&key).unwrap().unwrap();
        assert_eq!(round_tripped, shard);
    }

    #[test]
    fn migration_removes_legacy_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let subdir = Subdir::new("noarch");
        let key = ShardKey::new(&subdir, "bar-1.0.tar.bz2");

        let legacy_path = dir.path().join(key.legacy_path(12));
        fs_err::create_dir_all(legacy_path.parent().unwrap()).unwrap();
        let shard = Shard::null(subdir.clone(), "bar-1.0.tar.bz2".into(), Label::main(), "https://example/bar".into());
        fs_err::write(&legacy_path, serde_json::to_vec(&shard).unwrap()).unwrap();

        assert_eq!(store.resolve_path(&key), Some(legacy_path.clone()));

        store.write(&shard).unwrap();
        assert!(!legacy_path.exists());
    }

    #[test]
    fn read_migrates_legacy_shard_to_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let subdir = Subdir::new("noarch");
        let key = ShardKey::new(&subdir, "qux-1.0.tar.bz2");

        let legacy_path = dir.path().join(key.legacy_path(12));
        fs_err::create_dir_all(legacy_path.parent().unwrap()).unwrap();
        let shard = Shard::null(subdir.clone(), "qux-1.0.tar.bz2".into(), Label::main(), "https://example/qux".into());
        fs_err::write(&legacy_path, serde_json::to_vec(&shard).unwrap()).unwrap();

        let round_tripped = store.read(&key).unwrap().unwrap();
        assert_eq!(round_tripped, shard);

        let canonical = dir.path().join(key.canonical_path(3));
        assert!(canonical.exists());
        assert!(!legacy_path.exists());
    }

    #[test]
    fn list_subdir_finds_canonical_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let subdir = Subdir::new("linux-64");
        let shard = Shard::null(subdir.clone(), "baz-1.0.tar.bz2".into(), Label::main(), "https://example/baz".into());
        store.write(&shard).unwrap();

        let found = store.list_subdir(&subdir).unwrap();
        assert_eq!(found.len(), 1);
    }
}
