use repodata_config::RepoError;
use repodata_types::LinkTable;

use crate::asset::{Asset, ContentType};

/// A versioned artifact host shaped like GitHub Releases: a release is
/// identified by a tag, holds zero or more named assets, and assets are
/// immutable once uploaded (re-uploading under the same name is a no-op,
/// not an overwrite) — the same contract `releases.py::get_or_make_release`/
/// `upload_asset` rely on.
#[async_trait::async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Creates the release for `tag` if it doesn't already exist, and
    /// returns its currently-uploaded assets.
    async fn get_or_create_release(&self, tag: &str) -> Result<Vec<Asset>, RepoError>;

    /// Uploads `bytes` under `name` unless an asset with that name already
    /// exists, in which case the existing asset is returned unchanged.
    async fn upload_asset(
        &self,
        tag: &str,
        name: &str,
        bytes: &[u8],
        content_type: ContentType,
    ) -> Result<Asset, RepoError>;

    async fn publish(&self, tag: &str) -> Result<(), RepoError>;

    async fn delete_release(&self, tag: &str) -> Result<(), RepoError>;

    async fn list_release_tags(&self) -> Result<Vec<String>, RepoError>;

    /// Latest published `links.json.bz2` contents, or `None` if no
    /// release has ever published one (the Worker Loop's `Fatal` case
    /// when `--make-releases` is set and no prior state exists).
    async fn latest_links(&self) -> Result<Option<LinkTable>, RepoError>;
}

/// Idempotent upload helper: looks for `name` in `existing_assets` before
/// delegating to the store, mirroring `releases.py::upload_asset`'s
/// linear scan over `curr_asts`.
pub async fn upload_idempotent(
    store: &dyn ReleaseStore,
    tag: &str,
    existing_assets: &[Asset],
    name: &str,
    bytes: &[u8],
) -> Result<Asset, RepoError> {
    if let Some(existing) = existing_assets.iter().find(|a| a.name == name) {
        return Ok(existing.clone());
    }
    store.upload_asset(tag, name, bytes, ContentType::from_filename(name)).await
}

/// Picks release tags that are no longer referenced by any URL recorded
/// in the current Link Table, mirroring `repoworker.py::_delete_old_releases`'s
/// GC rule. Returns the tags that are safe to delete.
pub fn releases_to_delete<'a>(all_tags: &[&'a str], links: &LinkTable) -> Vec<&'a str> {
    let referenced = links.referenced_tags(all_tags);
    all_tags
        .iter()
        .copied()
        .filter(|tag| !referenced.contains(tag))
        .collect()
}
