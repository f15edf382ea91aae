use repodata_config::RepoError;
use repodata_types::{Label, Subdir};

/// The upstream package index this pipeline mirrors from. `main` reads
/// `repodata_from_packages.json`; any other label reads its
/// `label/{label}/{subdir}/repodata.json` variant — the same URL split
/// `anaconda_sync.py::_get_cached_repodata` makes.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_repodata(&self, subdir: &Subdir, label: &Label) -> Result<serde_json::Value, RepoError>;

    /// The channel-wide `channeldata.json`, used to backfill a shard whose
    /// indexer run produced no channeldata for its package.
    async fn fetch_channeldata(&self) -> Result<serde_json::Value, RepoError>;
}

pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> HttpCatalog {
        HttpCatalog { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn url(&self, subdir: &Subdir, label: &Label) -> String {
        if label.is_main() {
            format!("{}/{}/repodata_from_packages.json", self.base_url, subdir.as_str())
        } else {
            format!(
                "{}/label/{}/{}/repodata.json",
                self.base_url,
                label.as_str(),
                subdir.as_str()
            )
        }
    }

    fn channeldata_url(&self) -> String {
        format!("{}/channeldata.json", self.base_url)
    }
}

#[async_trait::async_trait]
impl Catalog for HttpCatalog {
    async fn fetch_repodata(&self, subdir: &Subdir, label: &Label) -> Result<serde_json::Value, RepoError> {
        let response = self
            .client
            .get(self.url(subdir, label))
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?;
        Ok(response.json().await.map_err(RepoError::Http)?)
    }

    async fn fetch_channeldata(&self) -> Result<serde_json::Value, RepoError> {
        let response = self
            .client
            .get(self.channeldata_url())
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?;
        Ok(response.json().await.map_err(RepoError::Http)?)
    }
}
