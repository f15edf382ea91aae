use std::sync::Arc;

use arc_swap::ArcSwap;
use repodata_release::ReleaseStore;
use repodata_types::LinkTable;

/// Shared application state. The Link Table is held behind an
/// [`ArcSwap`] so readers never block and a refresh never needs a
/// stop-the-world pause — replacing the original design's global mutable
/// dict plus an explicit garbage collection pass after every refresh.
pub struct AppState {
    pub links: ArcSwap<LinkTable>,
    pub release_store: Arc<dyn ReleaseStore>,
    pub update_links_secret: Option<String>,
}

impl AppState {
    pub fn new(release_store: Arc<dyn ReleaseStore>, update_links_secret: Option<String>) -> AppState {
        AppState {
            links: ArcSwap::from_pointee(LinkTable::new()),
            release_store,
            update_links_secret,
        }
    }

    pub fn current_links(&self) -> Arc<LinkTable> {
        self.links.load_full()
    }

    pub async fn refresh(&self) -> Result<(), repodata_config::RepoError> {
        if let Some(table) = self.release_store.latest_links().await? {
            self.links.store(Arc::new(table));
        }
        Ok(())
    }
}
