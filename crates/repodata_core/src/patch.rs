use std::collections::HashSet;
use std::path::Path;

use repodata_config::RepoError;
use repodata_types::{RepoDataDocument, Subdir};
use serde_json::{Map, Value};

/// A pluggable patch function, modeled the way `rattler_index::write_repodata`
/// applies a `patch_instructions.json`: a set of per-package field
/// overrides (`gen_new_index`) plus an explicit removal list
/// (`gen_removals`). Loaded from an external patch-set repository, which
/// this pipeline treats as an opaque collaborator.
pub trait PatchModule: Send + Sync {
    /// Per-package field overrides, keyed by package filename. Each value
    /// is merged into the existing package record field-by-field.
    fn gen_new_index(&self, document: &RepoDataDocument) -> Map<String, Value>;

    /// Package filenames that should be considered removed.
    fn gen_removals(&self, document: &RepoDataDocument) -> Vec<String>;
}

/// A patch module that changes nothing, for channels with no patch set.
pub struct NoopPatch;

impl PatchModule for NoopPatch {
    fn gen_new_index(&self, _document: &RepoDataDocument) -> Map<String, Value> {
        Map::new()
    }

    fn gen_removals(&self, _document: &RepoDataDocument) -> Vec<String> {
        Vec::new()
    }
}

/// A patch module backed by a `patch_instructions.json` file, the same
/// per-subdir override/removal document `rattler_index::write_repodata`
/// merges in: `{"remove": [...], "packages": {...}, "packages.conda": {...}}`.
pub struct FilePatchModule {
    overrides: Map<String, Value>,
    removals: Vec<String>,
}

impl PatchModule for FilePatchModule {
    fn gen_new_index(&self, _document: &RepoDataDocument) -> Map<String, Value> {
        self.overrides.clone()
    }

    fn gen_removals(&self, _document: &RepoDataDocument) -> Vec<String> {
        self.removals.clone()
    }
}

impl FilePatchModule {
    /// Loads `<patch_repo>/<subdir>/patch_instructions.json`, boxed as a
    /// [`NoopPatch`] when the subdir carries no patch file — most subdirs
    /// in a channel's patch-set repo have none.
    pub fn load_for_subdir(patch_repo: &Path, subdir: &Subdir) -> Result<Box<dyn PatchModule>, RepoError> {
        let path = patch_repo.join(subdir.as_str()).join("patch_instructions.json");
        if !path.exists() {
            return Ok(Box::new(NoopPatch));
        }
        let bytes = std::fs::read(&path)?;
        let document: Value = serde_json::from_slice(&bytes)?;

        let mut overrides = document.get("packages").and_then(Value::as_object).cloned().unwrap_or_default();
        if let Some(conda) = document.get("packages.conda").and_then(Value::as_object) {
            overrides.extend(conda.clone());
        }
        let removals = document
            .get("remove")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        Ok(Box::new(FilePatchModule { overrides, removals }))
    }
}

/// Applies a patch module against `raw` (the unpatched repodata folded
/// straight from shards), writing the result into `patched`. `removed` is
/// always recomputed from `gen_removals(raw)` and the named packages
/// always stripped from `patched` — in both modes, never merged with
/// whatever `patched.removed` previously held. Guessing at incremental-mode
/// intent from a stale removed list has caused the subtle republish bugs
/// this design explicitly avoids.
///
/// On a full rebuild, `patched`'s packages are replaced wholesale with
/// `raw`'s before overrides are merged in. Incrementally, only packages
/// present in `raw` but not yet in `patched` (and not removed) are copied
/// over; a package already in `patched` is assumed already patched from a
/// prior iteration, so overrides are restricted to that same new-package
/// domain rather than reapplied to the whole document.
pub fn apply_patch(raw: &RepoDataDocument, patched: &mut RepoDataDocument, patch: &dyn PatchModule, full_rebuild: bool) {
    let removed = patch.gen_removals(raw);
    let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();

    let incremental_domain = if full_rebuild {
        patched.packages = raw.packages.clone();
        patched.packages_conda = raw.packages_conda.clone();
        None
    } else {
        let mut domain = HashSet::new();
        for package in raw.packages.keys().chain(raw.packages_conda.keys()) {
            if removed_set.contains(package.as_str())
                || patched.packages.contains_key(package)
                || patched.packages_conda.contains_key(package)
            {
                continue;
            }
            domain.insert(package.clone());
        }
        for package in &domain {
            if let Some(record) = raw.packages.get(package) {
                patched.packages.insert(package.clone(), record.clone());
            } else if let Some(record) = raw.packages_conda.get(package) {
                patched.packages_conda.insert(package.clone(), record.clone());
            }
        }
        Some(domain)
    };

    for package in &removed {
        patched.packages.remove(package);
        patched.packages_conda.remove(package);
    }
    patched.removed = removed;

    let instructions = patch.gen_new_index(raw);
    for (package, overrides) in instructions {
        if let Some(domain) = &incremental_domain {
            if !domain.contains(&package) {
                continue;
            }
        }
        let target = patched
            .packages
            .get_mut(&package)
            .or_else(|| patched.packages_conda.get_mut(&package));
        if let (Some(Value::Object(target)), Value::Object(overrides)) = (target, overrides) {
            for (field, value) in overrides {
                target.insert(field, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_patch_module_falls_back_to_noop_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let patch = FilePatchModule::load_for_subdir(dir.path(), &Subdir::new("linux-64")).unwrap();
        let doc = RepoDataDocument::new("linux-64");
        assert!(patch.gen_new_index(&doc).is_empty());
        assert!(patch.gen_removals(&doc).is_empty());
    }

    #[test]
    fn file_patch_module_loads_overrides_and_removals() {
        let dir = tempfile::tempdir().unwrap();
        let subdir_dir = dir.path().join("linux-64");
        std::fs::create_dir_all(&subdir_dir).unwrap();
        std::fs::write(
            subdir_dir.join("patch_instructions.json"),
            serde_json::to_vec(&serde_json::json!({
                "remove": ["gone-1.0-0.tar.bz2"],
                "packages": {"foo-1.0-0.tar.bz2": {"build_number": 1}},
                "packages.conda": {"bar-1.0-0.conda": {"build_number": 2}}
            }))
            .unwrap(),
        )
        .unwrap();

        let patch = FilePatchModule::load_for_subdir(dir.path(), &Subdir::new("linux-64")).unwrap();
        let doc = RepoDataDocument::new("linux-64");
        assert_eq!(patch.gen_removals(&doc), vec!["gone-1.0-0.tar.bz2".to_string()]);
        let overrides = patch.gen_new_index(&doc);
        assert_eq!(overrides["foo-1.0-0.tar.bz2"]["build_number"], 1);
        assert_eq!(overrides["bar-1.0-0.conda"]["build_number"], 2);
    }

    struct FixedPatch {
        overrides: Map<String, Value>,
        removals: Vec<String>,
    }

    impl PatchModule for FixedPatch {
        fn gen_new_index(&self, _document: &RepoDataDocument) -> Map<String, Value> {
            self.overrides.clone()
        }

        fn gen_removals(&self, _document: &RepoDataDocument) -> Vec<String> {
            self.removals.clone()
        }
    }

    fn document_with_package(name: &str) -> RepoDataDocument {
        let mut doc = RepoDataDocument::new("linux-64");
        doc.packages.insert(name.to_string(), serde_json::json!({"build_number": 0}));
        doc
    }

    #[test]
    fn overrides_merge_into_existing_record() {
        let raw = document_with_package("foo-1.0-0.tar.bz2");
        let mut patched = RepoDataDocument::new("linux-64");
        let mut overrides = Map::new();
        overrides.insert(
            "foo-1.0-0.tar.bz2".to_string(),
            serde_json::json!({"build_number": 1}),
        );
        let patch = FixedPatch { overrides, removals: vec![] };
        apply_patch(&raw, &mut patched, &patch, true);
        assert_eq!(patched.packages["foo-1.0-0.tar.bz2"]["build_number"], 1);
    }

    #[test]
    fn full_rebuild_resets_removed_unconditionally() {
        let raw = document_with_package("foo-1.0-0.tar.bz2");
        let mut patched = RepoDataDocument::new("linux-64");
        patched.removed = vec!["stale-entry.tar.bz2".to_string()];
        let patch = FixedPatch {
            overrides: Map::new(),
            removals: vec!["foo-1.0-0.tar.bz2".to_string()],
        };
        apply_patch(&raw, &mut patched, &patch, true);
        assert_eq!(patched.removed, vec!["foo-1.0-0.tar.bz2".to_string()]);
        assert!(!patched.packages.contains_key("foo-1.0-0.tar.bz2"));
    }

    #[test]
    fn incremental_mode_also_resets_removed() {
        let raw = document_with_package("foo-1.0-0.tar.bz2");
        let mut patched = RepoDataDocument::new("linux-64");
        patched.removed = vec!["stale-entry.tar.bz2".to_string()];
        let patch = FixedPatch {
            overrides: Map::new(),
            removals: vec!["foo-1.0-0.tar.bz2".to_string()],
        };
        apply_patch(&raw, &mut patched, &patch, false);
        assert_eq!(patched.removed, vec!["foo-1.0-0.tar.bz2".to_string()]);
        assert!(!patched.packages.contains_key("foo-1.0-0.tar.bz2"));
    }

    #[test]
    fn incremental_mode_only_copies_new_packages() {
        let mut raw = RepoDataDocument::new("linux-64");
        raw.packages.insert("foo-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 0}));
        raw.packages.insert("bar-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 0}));

        let mut patched = RepoDataDocument::new("linux-64");
        patched
            .packages
            .insert("foo-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 0, "already_patched": true}));

        let patch = FixedPatch { overrides: Map::new(), removals: vec![] };
        apply_patch(&raw, &mut patched, &patch, false);

        assert_eq!(patched.packages["foo-1.0-0.tar.bz2"]["already_patched"], true);
        assert!(patched.packages.contains_key("bar-1.0-0.tar.bz2"));
    }

    #[test]
    fn incremental_mode_restricts_overrides_to_new_packages() {
        let mut raw = RepoDataDocument::new("linux-64");
        raw.packages.insert("foo-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 0}));
        raw.packages.insert("bar-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 0}));

        let mut patched = RepoDataDocument::new("linux-64");
        patched
            .packages
            .insert("foo-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 0}));

        let mut overrides = Map::new();
        overrides.insert("foo-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 9}));
        overrides.insert("bar-1.0-0.tar.bz2".to_string(), serde_json::json!({"build_number": 9}));
        let patch = FixedPatch { overrides, removals: vec![] };
        apply_patch(&raw, &mut patched, &patch, false);

        assert_eq!(patched.packages["foo-1.0-0.tar.bz2"]["build_number"], 0);
        assert_eq!(patched.packages["bar-1.0-0.tar.bz2"]["build_number"], 9);
    }
}
