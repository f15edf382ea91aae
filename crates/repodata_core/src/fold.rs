use repodata_types::{Label, LinkTable, RepoDataDocument, Shard, Subdir};

/// Folds every shard for `(subdir, label)` into a repodata document,
/// recording each contributing package's upstream URL into `links` along
/// the way. Each shard contributes at most one package record, keyed by
/// its own filename, matching the one-shard-per-package invariant the
/// Shard Store maintains. Populating `links.packages` here — rather than
/// as a separate pass — keeps it from ever drifting out of sync with the
/// fold it describes.
pub fn fold_repodata(shards: &[Shard], subdir: &Subdir, label: &Label, links: &mut LinkTable) -> RepoDataDocument {
    let mut document = RepoDataDocument::new(subdir.as_str());
    for shard in shards {
        if shard.subdir != *subdir || !shard.labels.contains(label) {
            continue;
        }
        links.record_package(format!("{}/{}", subdir.as_str(), shard.package), shard.url.clone());
        let Some(record) = &shard.repodata else { continue };
        if shard.package.ends_with(".conda") {
            document.packages_conda.insert(shard.package.clone(), record.clone());
        } else {
            document.packages.insert(shard.package.clone(), record.clone());
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodata_types::ShardKey;

    fn indexable_shard(subdir: &str, package: &str, label: &str) -> Shard {
        let mut shard = Shard::null(Subdir::new(subdir), package.to_string(), Label::new(label), "https://example".into());
        shard.repodata = Some(serde_json::json!({"name": "foo"}));
        shard.repodata_version = Some(1);
        shard
    }

    #[test]
    fn only_matching_subdir_and_label_are_included() {
        let shards = vec![
            indexable_shard("linux-64", "a-1.0.tar.bz2", "main"),
            indexable_shard("linux-64", "b-1.0.tar.bz2", "rc"),
            indexable_shard("osx-64", "c-1.0.tar.bz2", "main"),
        ];
        let mut links = repodata_types::LinkTable::new();
        let doc = fold_repodata(&shards, &Subdir::new("linux-64"), &Label::main(), &mut links);
        assert_eq!(doc.packages.len(), 1);
        assert!(doc.packages.contains_key("a-1.0.tar.bz2"));
    }

    #[test]
    fn null_shards_are_skipped() {
        let subdir = Subdir::new("linux-64");
        let shard = Shard::null(subdir.clone(), "a-1.0.tar.bz2".into(), Label::main(), "https://example".into());
        let mut links = repodata_types::LinkTable::new();
        let doc = fold_repodata(&[shard], &subdir, &Label::main(), &mut links);
        assert!(doc.packages.is_empty());
    }

    #[test]
    fn conda_extension_goes_to_its_own_map() {
        let shard = indexable_shard("linux-64", "a-1.0.conda", "main");
        let mut links = repodata_types::LinkTable::new();
        let doc = fold_repodata(&[shard], &Subdir::new("linux-64"), &Label::main(), &mut links);
        assert!(doc.packages_conda.contains_key("a-1.0.conda"));
        assert!(doc.packages.is_empty());
    }

    #[test]
    fn fold_records_package_url_into_link_table() {
        let shard = indexable_shard("linux-64", "a-1.0.tar.bz2", "main");
        let mut links = repodata_types::LinkTable::new();
        fold_repodata(&[shard], &Subdir::new("linux-64"), &Label::main(), &mut links);
        assert_eq!(links.package_url("linux-64/a-1.0.tar.bz2"), Some("https://example"));
    }

    #[test]
    fn shard_key_matches_shard_package() {
        let shard = indexable_shard("linux-64", "a-1.0.tar.bz2", "main");
        let key = ShardKey::new(&shard.subdir, &shard.package);
        assert_eq!(key.package(), "a-1.0.tar.bz2");
    }
}
