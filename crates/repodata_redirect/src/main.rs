use std::sync::Arc;

use repodata_config::{telemetry, RedirectConfig};
use repodata_redirect::{router, AppState};
use repodata_release::{GithubReleaseStore, ReleaseStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("info");

    let config = RedirectConfig::from_env();
    let (owner, repo) = config.owner_repo();
    let release_store: Arc<dyn ReleaseStore> = Arc::new(GithubReleaseStore::new(
        config.github_token.as_deref().unwrap_or_default(),
        owner,
        repo,
    ));

    let state = Arc::new(AppState::new(release_store, config.update_links_secret.clone()));
    if let Err(e) = state.refresh().await {
        tracing::warn!(error = %e, "initial link table load failed, starting with an empty table");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
