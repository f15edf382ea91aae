use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{body::Bytes, Router};

use crate::state::AppState;
use crate::webhook::verify_signature;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/{channel}/", get(channel_index))
        .route("/{channel}/channeldata.json", get(channeldata))
        .route("/{channel}/{subdir}/", get(subdir_index))
        .route("/{channel}/{subdir}/repodata.json", get(repodata_json))
        .route("/{channel}/{subdir}/repodata.json.bz2", get(repodata_json_bz2))
        .route("/{channel}/{subdir}/repodata_from_packages.json", get(repodata_from_packages))
        .route("/{channel}/{subdir}/repodata_from_packages.json.bz2", get(repodata_from_packages_bz2))
        .route("/{channel}/{subdir}/current_repodata.json", get(current_repodata))
        .route("/{channel}/{subdir}/current_repodata.json.bz2", get(current_repodata_bz2))
        .route("/{channel}/{subdir}/{pkg}", get(package))
        .route("/{channel}/label/{label}/", get(label_channel_index))
        .route("/{channel}/label/{label}/channeldata.json", get(label_channeldata))
        .route("/{channel}/label/{label}/{subdir}/", get(label_subdir_index))
        .route("/{channel}/label/{label}/{subdir}/repodata.json", get(label_repodata_json))
        .route("/{channel}/label/{label}/{subdir}/repodata.json.bz2", get(label_repodata_json_bz2))
        .route(
            "/{channel}/label/{label}/{subdir}/repodata_from_packages.json",
            get(label_repodata_from_packages),
        )
        .route(
            "/{channel}/label/{label}/{subdir}/repodata_from_packages.json.bz2",
            get(label_repodata_from_packages_bz2),
        )
        .route("/{channel}/label/{label}/{subdir}/current_repodata.json", get(label_current_repodata))
        .route(
            "/{channel}/label/{label}/{subdir}/current_repodata.json.bz2",
            get(label_current_repodata_bz2),
        )
        .route("/{channel}/label/{label}/{subdir}/{pkg}", get(label_package))
        .route("/update-links", post(update_links))
        .with_state(state)
}

enum RedirectError {
    NotFound,
}

impl IntoResponse for RedirectError {
    fn into_response(self) -> Response {
        match self {
            RedirectError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
        }
    }
}

/// Builds the contract filename a release publishes the artifact under,
/// e.g. `repodata_linux-64_main.json.bz2` or `channeldata_main.json`.
fn artifact_filename(prefix: &str, subdir: Option<&str>, label: Option<&str>, ext: &str) -> String {
    let label = label.unwrap_or("main");
    match subdir {
        Some(subdir) => format!("{prefix}_{subdir}_{label}.{ext}"),
        None => format!("{prefix}_{label}.{ext}"),
    }
}

async fn redirect_to_artifact(
    state: &AppState,
    prefix: &str,
    subdir: Option<&str>,
    label: Option<&str>,
    ext: &str,
) -> Result<Response, RedirectError> {
    let links = state.current_links();
    let filename = artifact_filename(prefix, subdir, label, ext);
    match links.latest_artifact_url(&filename) {
        Some(url) => Ok(Redirect::temporary(url).into_response()),
        None => Err(RedirectError::NotFound),
    }
}

async fn channel_index() -> &'static str {
    "conda-forge channel"
}

async fn label_channel_index(Path((_channel, _label)): Path<(String, String)>) -> &'static str {
    "conda-forge channel"
}

async fn subdir_index(Path((_channel, _subdir)): Path<(String, String)>) -> &'static str {
    "conda-forge subdir"
}

async fn label_subdir_index(Path((_channel, _label, _subdir)): Path<(String, String, String)>) -> &'static str {
    "conda-forge subdir"
}

async fn channeldata(State(state): State<Arc<AppState>>, Path(channel): Path<String>) -> Result<Response, RedirectError> {
    let _ = channel;
    redirect_to_artifact(&state, "channeldata", None, None, "json").await
}

async fn label_channeldata(
    State(state): State<Arc<AppState>>,
    Path((channel, label)): Path<(String, String)>,
) -> Result<Response, RedirectError> {
    let _ = channel;
    redirect_to_artifact(&state, "channeldata", None, Some(&label), "json").await
}

macro_rules! subdir_artifact_handler {
    ($name:ident, $prefix:literal, $ext:literal) => {
        async fn $name(
            State(state): State<Arc<AppState>>,
            Path((channel, subdir)): Path<(String, String)>,
        ) -> Result<Response, RedirectError> {
            let _ = channel;
            redirect_to_artifact(&state, $prefix, Some(&subdir), None, $ext).await
        }
    };
}

subdir_artifact_handler!(repodata_json, "repodata", "json");
subdir_artifact_handler!(repodata_json_bz2, "repodata", "json.bz2");
subdir_artifact_handler!(repodata_from_packages, "repodata_from_packages", "json");
subdir_artifact_handler!(repodata_from_packages_bz2, "repodata_from_packages", "json.bz2");
subdir_artifact_handler!(current_repodata, "current_repodata", "json");
subdir_artifact_handler!(current_repodata_bz2, "current_repodata", "json.bz2");

macro_rules! label_subdir_artifact_handler {
    ($name:ident, $prefix:literal, $ext:literal) => {
        async fn $name(
            State(state): State<Arc<AppState>>,
            Path((channel, label, subdir)): Path<(String, String, String)>,
        ) -> Result<Response, RedirectError> {
            let _ = channel;
            redirect_to_artifact(&state, $prefix, Some(&subdir), Some(&label), $ext).await
        }
    };
}

label_subdir_artifact_handler!(label_repodata_json, "repodata", "json");
label_subdir_artifact_handler!(label_repodata_json_bz2, "repodata", "json.bz2");
label_subdir_artifact_handler!(label_repodata_from_packages, "repodata_from_packages", "json");
label_subdir_artifact_handler!(label_repodata_from_packages_bz2, "repodata_from_packages", "json.bz2");
label_subdir_artifact_handler!(label_current_repodata, "current_repodata", "json");
label_subdir_artifact_handler!(label_current_repodata_bz2, "current_repodata", "json.bz2");

async fn package(
    State(state): State<Arc<AppState>>,
    Path((channel, subdir, pkg)): Path<(String, String, String)>,
) -> Result<Response, RedirectError> {
    let _ = channel;
    let links = state.current_links();
    match links.package_url(&format!("{subdir}/{pkg}")) {
        Some(url) => Ok(Redirect::temporary(url).into_response()),
        None => Err(RedirectError::NotFound),
    }
}

async fn label_package(
    State(state): State<Arc<AppState>>,
    Path((channel, label, subdir, pkg)): Path<(String, String, String, String)>,
) -> Result<Response, RedirectError> {
    let _ = (channel, label);
    let links = state.current_links();
    match links.package_url(&format!("{subdir}/{pkg}")) {
        Some(url) => Ok(Redirect::temporary(url).into_response()),
        None => Err(RedirectError::NotFound),
    }
}

async fn update_links(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let event = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Some(secret) = &state.update_links_secret else {
        return (StatusCode::SERVICE_UNAVAILABLE, "webhook secret not configured").into_response();
    };

    let signature = headers
        .get("X-Hub-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_signature(secret, signature, &body) {
        return (StatusCode::FORBIDDEN, "bad signature").into_response();
    }

    if event == "ping" {
        return "pong".into_response();
    }

    match state.refresh().await {
        Ok(()) => "ok".into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to refresh link table");
            (StatusCode::INTERNAL_SERVER_ERROR, "refresh failed").into_response()
        }
    }
}
