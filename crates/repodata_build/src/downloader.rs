use std::path::Path;

use repodata_config::{transient, RepoError};

/// Fetches a single package archive to a local path. Modeled as a trait so
/// the builder pipeline is testable with an in-memory fake, the way
/// `rattler_index` parameterizes storage over an `opendal::Operator`
/// rather than a concrete backend.
#[async_trait::async_trait]
pub trait PackageDownloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), RepoError>;
}

/// Downloads over HTTP, falling back to the anaconda.org web UI URL when a
/// `HEAD` against the primary URL doesn't return 200 — some conda-forge
/// mirror URLs bitrot while the web UI redirect keeps working, per
/// `shards.py::make_repodata_shard_noretry`.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> HttpDownloader {
        HttpDownloader { client: reqwest::Client::new() }
    }

    pub fn fallback_url(subdir: &str, package: &str, name: &str, version: &str) -> String {
        format!("https://anaconda.org/conda-forge/{name}/{version}/download/{subdir}/{package}")
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        HttpDownloader::new()
    }
}

#[async_trait::async_trait]
impl PackageDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), RepoError> {
        let fetch_url = self.resolve_url(url).await;
        let response = self
            .client
            .get(&fetch_url)
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?;
        let bytes = response.bytes().await.map_err(RepoError::Http)?;
        if let Some(parent) = dest.parent() {
            fs_err_create_dir_all(parent)?;
        }
        fs_err_write(dest, &bytes)?;
        Ok(())
    }
}

impl HttpDownloader {
    /// Probes `url` with a `HEAD` request and, if it doesn't come back
    /// 200, falls back to the anaconda.org web UI download URL derived
    /// from the package filename — mirroring `shards.py`'s behavior for
    /// mirror URLs that have bitrotted.
    async fn resolve_url(&self, url: &str) -> String {
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => url.to_string(),
            _ => match fallback_from_url(url) {
                Some(fallback) => fallback,
                None => url.to_string(),
            },
        }
    }
}

/// Derives the anaconda.org web UI fallback URL from a primary package
/// URL of the shape `.../<subdir>/<package>`, when the package filename
/// encodes a recoverable name/version.
fn fallback_from_url(url: &str) -> Option<String> {
    let (rest, package) = url.rsplit_once('/')?;
    let subdir = rest.rsplit('/').next()?;
    let stripped = package.strip_suffix(".conda").or_else(|| package.strip_suffix(".tar.bz2"))?;
    let (name_version, _build) = stripped.rsplit_once('-')?;
    let (name, version) = name_version.rsplit_once('-')?;
    Some(HttpDownloader::fallback_url(subdir, package, name, version))
}

fn fs_err_create_dir_all(path: &Path) -> Result<(), RepoError> {
    std::fs::create_dir_all(path).map_err(|e| transient(e))
}

fn fs_err_write(path: &Path, bytes: &[u8]) -> Result<(), RepoError> {
    std::fs::write(path, bytes).map_err(|e| transient(e))
}
