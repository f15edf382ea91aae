use repodata_config::RepoError;
use repodata_types::LinkTable;
use serde::Deserialize;

use crate::asset::{Asset, ContentType};
use crate::store::ReleaseStore;

/// A GitHub-Releases-backed [`ReleaseStore`], grounded on the REST calls
/// `releases.py` makes through PyGithub: `GET /repos/{owner}/{repo}/releases/tags/{tag}`,
/// `POST .../releases`, `POST` to the asset upload URL, and
/// `PATCH .../releases/{id}` to flip `draft` to `false` on publish.
pub struct GithubReleaseStore {
    client: reqwest::Client,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    assets: Vec<AssetResponse>,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    name: String,
    browser_download_url: String,
}

impl GithubReleaseStore {
    pub fn new(token: &str, owner: impl Into<String>, repo: impl Into<String>) -> GithubReleaseStore {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("token {token}").parse().expect("valid header value"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            "application/vnd.github+json".parse().expect("valid header value"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            "repodata-release-store".parse().expect("valid header value"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("client builds");
        GithubReleaseStore { client, owner: owner.into(), repo: repo.into() }
    }

    fn releases_url(&self) -> String {
        format!("https://api.github.com/repos/{}/{}/releases", self.owner, self.repo)
    }

    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseResponse>, RepoError> {
        let resp = self
            .client
            .get(format!("{}/tags/{tag}", self.releases_url()))
            .send()
            .await
            .map_err(RepoError::Http)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().map_err(RepoError::Http)?;
        Ok(Some(resp.json().await.map_err(RepoError::Http)?))
    }
}

#[async_trait::async_trait]
impl ReleaseStore for GithubReleaseStore {
    async fn get_or_create_release(&self, tag: &str) -> Result<Vec<Asset>, RepoError> {
        let release = match self.find_release(tag).await? {
            Some(r) => r,
            None => {
                let resp = self
                    .client
                    .post(self.releases_url())
                    .json(&serde_json::json!({ "tag_name": tag, "name": tag, "draft": true }))
                    .send()
                    .await
                    .map_err(RepoError::Http)?
                    .error_for_status()
                    .map_err(RepoError::Http)?;
                resp.json().await.map_err(RepoError::Http)?
            }
        };
        Ok(release
            .assets
            .into_iter()
            .map(|a| Asset { name: a.name, download_url: a.browser_download_url })
            .collect())
    }

    async fn upload_asset(
        &self,
        tag: &str,
        name: &str,
        bytes: &[u8],
        content_type: ContentType,
    ) -> Result<Asset, RepoError> {
        let release = self
            .find_release(tag)
            .await?
            .ok_or_else(|| RepoError::Inconsistent(format!("release {tag} does not exist")))?;
        let upload_url = format!(
            "https://uploads.github.com/repos/{}/{}/releases/{}/assets?name={name}",
            self.owner, self.repo, release.id
        );
        let resp = self
            .client
            .post(upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type.as_mime())
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?;
        let asset: AssetResponse = resp.json().await.map_err(RepoError::Http)?;
        Ok(Asset { name: asset.name, download_url: asset.browser_download_url })
    }

    async fn publish(&self, tag: &str) -> Result<(), RepoError> {
        let release = self
            .find_release(tag)
            .await?
            .ok_or_else(|| RepoError::Inconsistent(format!("release {tag} does not exist")))?;
        self.client
            .patch(format!("{}/{}", self.releases_url(), release.id))
            .json(&serde_json::json!({ "draft": false }))
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?;
        Ok(())
    }

    async fn delete_release(&self, tag: &str) -> Result<(), RepoError> {
        if let Some(release) = self.find_release(tag).await? {
            self.client
                .delete(format!("{}/{}", self.releases_url(), release.id))
                .send()
                .await
                .map_err(RepoError::Http)?
                .error_for_status()
                .map_err(RepoError::Http)?;
        }
        Ok(())
    }

    async fn list_release_tags(&self) -> Result<Vec<String>, RepoError> {
        #[derive(Deserialize)]
        struct Tagged {
            tag_name: String,
        }
        let resp = self
            .client
            .get(self.releases_url())
            .query(&[("per_page", "100")])
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?;
        let releases: Vec<Tagged> = resp.json().await.map_err(RepoError::Http)?;
        Ok(releases.into_iter().map(|r| r.tag_name).collect())
    }

    async fn latest_links(&self) -> Result<Option<LinkTable>, RepoError> {
        let resp = self
            .client
            .get(format!("{}/latest", self.releases_url()))
            .send()
            .await
            .map_err(RepoError::Http)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let release: ReleaseResponse = resp.error_for_status().map_err(RepoError::Http)?.json().await.map_err(RepoError::Http)?;
        let links_asset = release.assets.into_iter().find(|a| a.name == "links.json.bz2");
        let Some(links_asset) = links_asset else { return Ok(None) };

        let compressed = self
            .client
            .get(&links_asset.browser_download_url)
            .send()
            .await
            .map_err(RepoError::Http)?
            .error_for_status()
            .map_err(RepoError::Http)?
            .bytes()
            .await
            .map_err(RepoError::Http)?;

        let mut decoder = bzip2::read::BzDecoder::new(&compressed[..]);
        use std::io::Read;
        let mut json_bytes = Vec::new();
        decoder.read_to_end(&mut json_bytes).map_err(repodata_config::transient)?;
        let table: LinkTable = serde_json::from_slice(&json_bytes)?;
        Ok(Some(table))
    }
}
