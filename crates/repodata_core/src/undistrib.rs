use repodata_types::{PackageDenylist, Shard};

/// Extracts the bare package name from a conda filename, stripping the
/// `.tar.bz2`/`.conda` extension then the trailing `-<version>-<build>`.
/// Mirrors `utils.py::split_pkg`'s `rsplit('-', 1)` twice.
pub fn package_name_from_filename(filename: &str) -> Option<&str> {
    let stem = filename.strip_suffix(".tar.bz2").or_else(|| filename.strip_suffix(".conda"))?;
    let (name_ver, _build) = stem.rsplit_once('-')?;
    let (name, _ver) = name_ver.rsplit_once('-')?;
    Some(name)
}

/// Whether `shard` still needs an undistributable sweep pass: it names a
/// package on the undistributable list and hasn't already been swept
/// against the current denylist hash.
pub fn needs_sweep(shard: &Shard, denylist: &PackageDenylist, package_name: &str) -> bool {
    denylist.is_undistributable(package_name)
        && shard.undistributable_hash.as_deref() != Some(denylist.undistributable_hash().as_str())
}

/// Rewrites a shard's URL back to the plain upstream mirror URL (dropping
/// any per-package release asset URL) and stamps it with the current
/// denylist hash, mirroring `remove_undistrib.py::_remove_pkg_and_update_shard`'s
/// non-I/O half — the actual release/asset deletion is the Release
/// Store's concern.
pub fn sweep_shard(mut shard: Shard, denylist: &PackageDenylist) -> Shard {
    shard.url = format!(
        "https://conda.anaconda.org/conda-forge/{}/{}",
        shard.subdir.as_str(),
        shard.package
    );
    shard.undistributable_hash = Some(denylist.undistributable_hash());
    shard
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodata_types::{Label, Subdir};
    use std::collections::BTreeSet;

    #[test]
    fn sweep_rewrites_url_and_stamps_hash() {
        let denylist = PackageDenylist::new(BTreeSet::new(), BTreeSet::from(["foo".to_string()]));
        let shard = Shard::null(
            Subdir::new("linux-64"),
            "foo-1.0-0.tar.bz2".into(),
            Label::main(),
            "https://github.com/conda-forge/releases/download/x/foo-1.0-0.tar.bz2".into(),
        );
        assert!(needs_sweep(&shard, &denylist, "foo"));
        let swept = sweep_shard(shard, &denylist);
        assert_eq!(swept.url, "https://conda.anaconda.org/conda-forge/linux-64/foo-1.0-0.tar.bz2");
        assert!(!needs_sweep(&swept, &denylist, "foo"));
    }

    #[test]
    fn packages_not_on_list_never_need_sweep() {
        let denylist = PackageDenylist::default();
        let shard = Shard::null(Subdir::new("linux-64"), "foo-1.0-0.tar.bz2".into(), Label::main(), "https://example".into());
        assert!(!needs_sweep(&shard, &denylist, "foo"));
    }

    #[test]
    fn package_name_strips_version_and_build() {
        assert_eq!(package_name_from_filename("numpy-1.26.0-py311h0.tar.bz2"), Some("numpy"));
        assert_eq!(package_name_from_filename("my-long-name-2.0-0.conda"), Some("my-long-name"));
        assert_eq!(package_name_from_filename("not-a-package.json"), None);
    }
}
