use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use repodata_build::{build_shard, Indexer, PackageDownloader};
use repodata_config::RepoError;
use repodata_shards::{ShardStore, SourceControl};
use repodata_types::{Label, PackageDenylist, Shard, Subdir};
use tokio::sync::Semaphore;

use crate::catalog::Catalog;
use crate::rank::Rank;

/// Packages modified between commits, per `anaconda_sync.py::update_shards`'s
/// `len(shards_to_write) >= 64` batching rule.
const COMMIT_BATCH_SIZE: usize = 64;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    pub added: usize,
    pub label_merged: usize,
    pub skipped: usize,
}

/// Reconciles the shard store against the upstream catalog for one
/// `(subdir, label)` pair: packages present upstream but missing (or
/// missing this label) from the store are built or label-merged.
/// Mirrors the body of `anaconda_sync.py::update_shards`'s per-subdir loop.
#[allow(clippy::too_many_arguments)]
pub async fn sync_subdir_label(
    catalog: &dyn Catalog,
    store: &ShardStore,
    subdir: &Subdir,
    label: &Label,
    rank: Rank,
    downloader: Arc<dyn PackageDownloader>,
    indexer: Arc<dyn Indexer>,
    denylist: Arc<PackageDenylist>,
    concurrency: usize,
    source_control: Option<&dyn SourceControl>,
    pass_start: Instant,
    time_limit: Duration,
) -> Result<SyncOutcome, RepoError> {
    let document = catalog.fetch_repodata(subdir, label).await?;
    let channeldata = catalog.fetch_channeldata().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to fetch channeldata.json for backfill, proceeding without it");
        serde_json::json!({})
    });
    let packages = collect_package_names(&document);

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut outcome = SyncOutcome::default();
    let mut in_flight = FuturesUnordered::new();
    let mut batch = CommitBatch::new(source_control);

    for package in packages {
        let key = repodata_types::ShardKey::new(subdir, &package);
        if !rank.owns_package(&key) {
            outcome.skipped += 1;
            continue;
        }

        if let Some(mut existing) = store.read(&key)? {
            if existing.labels.iter().any(|l| l == label) {
                outcome.skipped += 1;
                continue;
            }
            existing.labels.push(label.clone());
            let path = store.write(&existing)?;
            batch.record(path);
            outcome.label_merged += 1;
        } else {
            let permit = semaphore.clone().acquire_owned().await.map_err(repodata_config::transient)?;
            let downloader = downloader.clone();
            let indexer = indexer.clone();
            let denylist = denylist.clone();
            let subdir = subdir.clone();
            let label_owned = label.clone();
            let package_url = canonical_url(&subdir, &package, &label_owned);

            in_flight.push(async move {
                let _permit = permit;
                let tmpdir = tempfile::tempdir().map_err(repodata_config::transient)?;
                build_shard(
                    subdir,
                    &package,
                    label_owned.as_str(),
                    None,
                    &package_url,
                    None,
                    tmpdir.path(),
                    downloader.as_ref(),
                    indexer.as_ref(),
                    denylist.as_ref(),
                )
                .await
            });

            if in_flight.len() >= concurrency.max(1) * 2 {
                if let Some(result) = in_flight.next().await {
                    handle_build_result(store, result, &document, &channeldata, &mut outcome, &mut batch)?;
                }
            }
        }

        if batch.should_flush(pass_start, time_limit) {
            batch.flush().await?;
        }
    }

    while let Some(result) = in_flight.next().await {
        handle_build_result(store, result, &document, &channeldata, &mut outcome, &mut batch)?;
        if batch.should_flush(pass_start, time_limit) {
            batch.flush().await?;
        }
    }

    batch.flush().await?;

    Ok(outcome)
}

/// Batches modified shard paths for a commit+push every
/// [`COMMIT_BATCH_SIZE`] shards or `time_limit` elapsed, mirroring
/// `anaconda_sync.py::update_shards`'s `_write_shards` cadence. A `None`
/// source control (no shards repo configured) makes this a no-op counter.
struct CommitBatch<'a> {
    source_control: Option<&'a dyn SourceControl>,
    paths: Vec<PathBuf>,
}

impl<'a> CommitBatch<'a> {
    fn new(source_control: Option<&'a dyn SourceControl>) -> CommitBatch<'a> {
        CommitBatch { source_control, paths: Vec::new() }
    }

    fn record(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn should_flush(&self, pass_start: Instant, time_limit: Duration) -> bool {
        !self.paths.is_empty() && (self.paths.len() >= COMMIT_BATCH_SIZE || pass_start.elapsed() >= time_limit)
    }

    async fn flush(&mut self) -> Result<(), RepoError> {
        if self.paths.is_empty() {
            return Ok(());
        }
        if let Some(source_control) = self.source_control {
            source_control.stage(&self.paths).await?;
            source_control.push_with_retry(&format!("sync {} shards", self.paths.len())).await?;
        }
        self.paths.clear();
        Ok(())
    }
}

fn handle_build_result(
    store: &ShardStore,
    result: Result<Shard, RepoError>,
    document: &serde_json::Value,
    channeldata: &serde_json::Value,
    outcome: &mut SyncOutcome,
    batch: &mut CommitBatch<'_>,
) -> Result<(), RepoError> {
    let mut shard = result?;
    backfill_from_catalog(&mut shard, document, channeldata);
    let path = store.write(&shard)?;
    batch.record(path);
    outcome.added += 1;
    Ok(())
}

/// Seeds a shard's `repodata`/`channeldata` from the already-fetched
/// catalog documents when the indexer came back empty-handed for it,
/// matching `anaconda_sync.py::update_shards`'s "sometimes conda index
/// chokes on a package, so we put in the data we have by hand" fallback.
/// The backfilled channeldata entry gets `subdirs`/`version` copied over
/// from the repodata record so it folds cleanly.
fn backfill_from_catalog(shard: &mut Shard, document: &serde_json::Value, channeldata: &serde_json::Value) {
    if shard.repodata.is_none() {
        if let Some(record) = document.get("packages").and_then(|p| p.get(&shard.package)) {
            shard.repodata_version = document.get("repodata_version").and_then(|v| v.as_u64()).map(|v| v as u32);
            shard.repodata = Some(record.clone());
        }
    }

    if shard.channeldata.is_none() {
        let Some(repodata) = &shard.repodata else { return };
        let Some(name) = repodata.get("name").and_then(|v| v.as_str()) else { return };
        if let Some(entry) = channeldata.get("packages").and_then(|p| p.get(name)) {
            let mut entry = entry.clone();
            if let Some(map) = entry.as_object_mut() {
                map.insert("subdirs".to_string(), serde_json::json!([shard.subdir.as_str()]));
                if let Some(version) = repodata.get("version") {
                    map.insert("version".to_string(), version.clone());
                }
            }
            shard.channeldata_version = channeldata.get("channeldata_version").and_then(|v| v.as_u64()).map(|v| v as u32);
            shard.channeldata = Some(entry);
        }
    }
}

fn collect_package_names(document: &serde_json::Value) -> Vec<String> {
    let mut names = Vec::new();
    for key in ["packages", "packages.conda"] {
        if let Some(map) = document.get(key).and_then(|v| v.as_object()) {
            names.extend(map.keys().cloned());
        }
    }
    names
}

fn canonical_url(subdir: &Subdir, package: &str, label: &Label) -> String {
    if label.is_main() {
        format!("https://conda.anaconda.org/conda-forge/{}/{}", subdir.as_str(), package)
    } else {
        format!(
            "https://conda.anaconda.org/conda-forge/label/{}/{}/{}",
            label.as_str(),
            subdir.as_str(),
            package
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use repodata_build::IndexOutput;
    use repodata_types::Label;

    struct FakeCatalog;

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn fetch_repodata(&self, _subdir: &Subdir, _label: &Label) -> Result<serde_json::Value, RepoError> {
            Ok(serde_json::json!({
                "packages": {
                    "foo-1.0-0.tar.bz2": {},
                },
                "packages.conda": {}
            }))
        }

        async fn fetch_channeldata(&self) -> Result<serde_json::Value, RepoError> {
            Ok(serde_json::json!({"packages": {}}))
        }
    }

    struct FakeDownloader;
    #[async_trait]
    impl PackageDownloader for FakeDownloader {
        async fn download(&self, _url: &str, dest: &std::path::Path) -> Result<(), RepoError> {
            if let Some(p) = dest.parent() {
                std::fs::create_dir_all(p).unwrap();
            }
            std::fs::write(dest, b"x").unwrap();
            Ok(())
        }
    }

    struct FakeIndexer;
    #[async_trait]
    impl Indexer for FakeIndexer {
        async fn index(&self, _tmpdir: &std::path::Path) -> Result<IndexOutput, RepoError> {
            Ok(IndexOutput {
                channeldata: serde_json::json!({"channeldata_version": 1, "packages": {"foo": {}}}),
                repodata: serde_json::json!({"repodata_version": 1, "packages": {"foo-1.0-0.tar.bz2": {"name": "foo"}}}),
            })
        }
    }

    #[tokio::test]
    async fn new_package_is_added() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let outcome = sync_subdir_label(
            &FakeCatalog,
            &store,
            &Subdir::new("linux-64"),
            &Label::main(),
            Rank::solo(),
            Arc::new(FakeDownloader),
            Arc::new(FakeIndexer),
            Arc::new(PackageDenylist::default()),
            4,
            None,
            Instant::now(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(outcome.added, 1);
    }

    #[tokio::test]
    async fn existing_shard_with_label_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let shard = repodata_types::Shard::null(
            Subdir::new("linux-64"),
            "foo-1.0-0.tar.bz2".to_string(),
            Label::main(),
            "https://example/foo".to_string(),
        );
        store.write(&shard).unwrap();

        let outcome = sync_subdir_label(
            &FakeCatalog,
            &store,
            &Subdir::new("linux-64"),
            &Label::main(),
            Rank::solo(),
            Arc::new(FakeDownloader),
            Arc::new(FakeIndexer),
            Arc::new(PackageDenylist::default()),
            4,
            None,
            Instant::now(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.added, 0);
    }

    struct BackfillCatalog;

    #[async_trait]
    impl Catalog for BackfillCatalog {
        async fn fetch_repodata(&self, _subdir: &Subdir, _label: &Label) -> Result<serde_json::Value, RepoError> {
            Ok(serde_json::json!({
                "repodata_version": 1,
                "packages": {
                    "foo-1.0-0.tar.bz2": {"name": "foo", "version": "1.0"},
                },
                "packages.conda": {}
            }))
        }

        async fn fetch_channeldata(&self) -> Result<serde_json::Value, RepoError> {
            Ok(serde_json::json!({
                "channeldata_version": 1,
                "packages": {"foo": {"summary": "a package"}}
            }))
        }
    }

    struct IndexerWithNoOutput;
    #[async_trait]
    impl Indexer for IndexerWithNoOutput {
        async fn index(&self, _tmpdir: &std::path::Path) -> Result<IndexOutput, RepoError> {
            Err(RepoError::Inconsistent("conda index choked".into()))
        }
    }

    #[tokio::test]
    async fn unindexable_package_is_backfilled_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path());
        let denylist = PackageDenylist::new(
            std::collections::BTreeSet::from(["linux-64/foo-1.0-0.tar.bz2".to_string()]),
            std::collections::BTreeSet::new(),
        );
        let outcome = sync_subdir_label(
            &BackfillCatalog,
            &store,
            &Subdir::new("linux-64"),
            &Label::main(),
            Rank::solo(),
            Arc::new(FakeDownloader),
            Arc::new(IndexerWithNoOutput),
            Arc::new(denylist),
            4,
            None,
            Instant::now(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(outcome.added, 1);
        let key = repodata_types::ShardKey::new(&Subdir::new("linux-64"), "foo-1.0-0.tar.bz2");
        let shard = store.read(&key).unwrap().unwrap();
        assert_eq!(shard.repodata.unwrap()["name"], "foo");
        let channeldata = shard.channeldata.unwrap();
        assert_eq!(channeldata["summary"], "a package");
        assert_eq!(channeldata["subdirs"], serde_json::json!(["linux-64"]));
        assert_eq!(channeldata["version"], "1.0");
    }
}
