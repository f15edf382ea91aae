use std::path::Path;
use std::time::SystemTime;

use repodata_config::retry::download_retry_policy;
use repodata_config::RepoError;
use repodata_types::{PackageDenylist, Shard, Subdir};
use retry_policies::{RetryDecision, RetryPolicy};

use crate::checksum::{md5_hex, verify};
use crate::downloader::PackageDownloader;
use crate::indexer::{IndexOutput, Indexer};

/// Retries `op` under [`download_retry_policy`], the bounded backoff spec.md
/// mandates around both the package download and the indexer subprocess.
async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, RepoError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RepoError>>,
{
    let policy = download_retry_policy();
    let start = SystemTime::now();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.severity().is_retryable() => return Err(e),
            Err(e) => match policy.should_retry(start, attempt) {
                RetryDecision::Retry { execute_after } => {
                    tracing::warn!(attempt, error = %e, "retrying after transient failure");
                    let delay = execute_after.duration_since(SystemTime::now()).unwrap_or_default();
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry => return Err(e),
            },
        }
    }
}

/// Downloads, checksums, and indexes a single package, producing its
/// shard. When the package is on the unindexable denylist and the
/// indexer fails, the shard degrades to a null-repodata shard instead of
/// propagating the error — the same behavior
/// `shards.py::make_repodata_shard_noretry` implements around its
/// `conda index` subprocess call.
pub async fn build_shard(
    subdir: Subdir,
    package: &str,
    label: &str,
    feedstock: Option<String>,
    url: &str,
    md5_checksum: Option<&str>,
    tmpdir: &Path,
    downloader: &dyn PackageDownloader,
    indexer: &dyn Indexer,
    denylist: &PackageDenylist,
) -> Result<Shard, RepoError> {
    let subdir_str = subdir.as_str().to_string();
    let dest = tmpdir.join(&subdir_str).join(package);
    std::fs::create_dir_all(tmpdir.join("noarch"))
        .map_err(repodata_config::transient)?;
    std::fs::create_dir_all(tmpdir.join(&subdir_str))
        .map_err(repodata_config::transient)?;

    with_retry(|| downloader.download(url, &dest)).await?;

    if let Some(expected) = md5_checksum {
        let bytes = std::fs::read(&dest).map_err(repodata_config::transient)?;
        verify(package, expected, &md5_hex(&bytes))?;
    }

    let subdir_pkg = format!("{subdir_str}/{package}");
    let indexed: Result<IndexOutput, RepoError> = with_retry(|| indexer.index(tmpdir)).await;

    let mut shard = Shard::null(subdir.clone(), package.to_string(), label.into(), url.to_string());
    shard.feedstock = feedstock;

    match indexed {
        Ok(output) => {
            let package_record = output
                .repodata
                .get("packages")
                .and_then(|p| p.get(package))
                .cloned();
            if let Some(record) = package_record {
                let name = record
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                shard.repodata_version = output
                    .repodata
                    .get("repodata_version")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32);
                shard.repodata = Some(record);
                shard.channeldata_version = output
                    .channeldata
                    .get("channeldata_version")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32);
                shard.channeldata = output
                    .channeldata
                    .get("packages")
                    .and_then(|p| p.get(&name))
                    .cloned();
            }
        }
        Err(e) if denylist.is_unindexable(&subdir_pkg) => {
            tracing::warn!(%subdir_pkg, error = %e, "indexing failed for unindexable package, using null shard");
        }
        Err(e) => return Err(e),
    }

    Ok(shard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexOutput;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct FakeDownloader;

    #[async_trait]
    impl PackageDownloader for FakeDownloader {
        async fn download(&self, _url: &str, dest: &std::path::Path) -> Result<(), RepoError> {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(dest, b"fake-archive-bytes").unwrap();
            Ok(())
        }
    }

    struct FakeIndexer {
        fail: bool,
    }

    #[async_trait]
    impl Indexer for FakeIndexer {
        async fn index(&self, _tmpdir: &std::path::Path) -> Result<IndexOutput, RepoError> {
            if self.fail {
                return Err(RepoError::Inconsistent("boom".into()));
            }
            Ok(IndexOutput {
                channeldata: serde_json::json!({
                    "channeldata_version": 1,
                    "packages": { "foo": { "description": "a package" } }
                }),
                repodata: serde_json::json!({
                    "repodata_version": 1,
                    "packages": { "foo-1.0-0.tar.bz2": { "name": "foo", "version": "1.0" } }
                }),
            })
        }
    }

    #[tokio::test]
    async fn builds_shard_from_successful_index() {
        let dir = tempfile::tempdir().unwrap();
        let denylist = PackageDenylist::default();
        let shard = build_shard(
            Subdir::new("linux-64"),
            "foo-1.0-0.tar.bz2",
            "main",
            None,
            "https://example/foo-1.0-0.tar.bz2",
            None,
            dir.path(),
            &FakeDownloader,
            &FakeIndexer { fail: false },
            &denylist,
        )
        .await
        .unwrap();

        assert!(shard.is_indexable());
        assert_eq!(shard.channeldata.unwrap()["description"], "a package");
    }

    #[tokio::test]
    async fn falls_back_to_null_shard_when_unindexable() {
        let dir = tempfile::tempdir().unwrap();
        let denylist = PackageDenylist::new(
            BTreeSet::from(["linux-64/foo-1.0-0.tar.bz2".to_string()]),
            BTreeSet::new(),
        );
        let shard = build_shard(
            Subdir::new("linux-64"),
            "foo-1.0-0.tar.bz2",
            "main",
            None,
            "https://example/foo-1.0-0.tar.bz2",
            None,
            dir.path(),
            &FakeDownloader,
            &FakeIndexer { fail: true },
            &denylist,
        )
        .await
        .unwrap();

        assert!(!shard.is_indexable());
    }

    #[tokio::test]
    async fn propagates_index_failure_when_not_denylisted() {
        let dir = tempfile::tempdir().unwrap();
        let denylist = PackageDenylist::default();
        let err = build_shard(
            Subdir::new("linux-64"),
            "foo-1.0-0.tar.bz2",
            "main",
            None,
            "https://example/foo-1.0-0.tar.bz2",
            None,
            dir.path(),
            &FakeDownloader,
            &FakeIndexer { fail: true },
            &denylist,
        )
        .await;
        assert!(err.is_err());
    }
}
