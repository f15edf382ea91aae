use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use repodata_build::{HttpDownloader, SubprocessIndexer};
use repodata_config::{transient, RepoError, WorkerConfig};
use repodata_core::{
    apply_patch, derive_current_repodata, encode, fold_channeldata, fold_repodata, EncodedArtifact, FilePatchModule,
    NoopPatch, PatchModule,
};
use repodata_release::{releases_to_delete, upload_idempotent, Asset, GithubReleaseStore, ReleaseStore};
use repodata_shards::{GitSourceControl, ShardStore, SourceControl};
use repodata_sync::{sync_subdir_label, HttpCatalog, Rank, SyncOutcome};
use repodata_types::{
    ChannelDataDocument, Label, LinkTable, PackageDenylist, RepoDataDocument, Shard, Subdir, CONDA_FORGE_SUBDIRS,
};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Shard-build/upload concurrency inside a single `(subdir, label)` sync
/// is `config.upload_concurrency`; this is the separate, fixed pool size
/// for uploading the handful of per-iteration published artifacts.
const UPLOAD_CONCURRENCY: usize = 8;

pub struct RunOptions {
    pub time_limit: Duration,
    pub make_releases: bool,
    pub main_only: bool,
    pub debug: bool,
    pub rank: Rank,
    /// Starts from an empty Link Table when no prior one exists instead of
    /// treating that as fatal. Only meant for a channel's very first run.
    pub allow_unsafe: bool,
}

/// Drives the incremental ingest/rebuild/publish loop until `time_limit`
/// elapses, sleeping at least `min_update_time` between iterations —
/// mirroring `repoworker.py::main`'s `MIN_UPDATE_TIME` pacing.
pub async fn run(options: RunOptions, config: WorkerConfig) -> Result<(), RepoError> {
    let start = Instant::now();
    let store = ShardStore::new(config.shards_repo_path.clone().unwrap_or_else(|| ".".to_string()));
    let shard_source_control = config.shards_repo_path.as_ref().map(|p| GitSourceControl::new(p.clone()));
    let patch_source_control = config.patch_set_path.as_ref().map(|p| GitSourceControl::new(p.clone()));
    let catalog = HttpCatalog::new("https://conda.anaconda.org/conda-forge");
    let downloader: Arc<dyn repodata_build::PackageDownloader> = Arc::new(HttpDownloader::new());
    let indexer: Arc<dyn repodata_build::Indexer> = Arc::new(SubprocessIndexer::new());
    let denylist = Arc::new(load_denylist(config.denylist_path.as_deref()));

    let labels: Vec<Label> = if options.main_only {
        vec![Label::main()]
    } else {
        std::iter::once(Label::main()).chain(config.extra_labels.iter().map(|l| Label::new(l.clone()))).collect()
    };

    let release_store = match (&config.github_token, &config.release_owner_repo) {
        (Some(token), Some(owner_repo)) => owner_repo
            .split_once('/')
            .map(|(owner, repo)| Arc::new(GithubReleaseStore::new(token, owner, repo)) as Arc<dyn ReleaseStore>),
        _ => None,
    };

    let mut link_table = load_starting_link_table(&options, &release_store).await?;
    let mut last_patch_rev = link_table.current_shas.patch_set.clone();
    let mut patched_docs: HashMap<(String, String), RepoDataDocument> = HashMap::new();
    let mut last_channeldata: HashMap<String, ChannelDataDocument> = HashMap::new();

    loop {
        let iteration_start = Instant::now();

        if let Some(sc) = &shard_source_control {
            sc.pull().await?;
        }
        if let Some(sc) = &patch_source_control {
            sc.pull().await?;
        }

        let shard_rev = match &shard_source_control {
            Some(sc) => Some(sc.current_rev().await?),
            None => None,
        };
        let patch_rev = match &patch_source_control {
            Some(sc) => Some(sc.current_rev().await?),
            None => None,
        };
        let repatch_all = patch_rev != last_patch_rev;
        last_patch_rev = patch_rev.clone();

        let mut pending_uploads: Vec<(String, Vec<u8>)> = Vec::new();

        for (label_idx, label) in labels.iter().enumerate() {
            for (subdir_idx, subdir_name) in CONDA_FORGE_SUBDIRS.iter().enumerate() {
                let subdir = Subdir::new(*subdir_name);
                let loop_index = label_idx * CONDA_FORGE_SUBDIRS.len() + subdir_idx;
                let owns_pair = options.rank.owns_loop_index(loop_index);

                let outcome = match sync_subdir_label(
                    &catalog,
                    &store,
                    &subdir,
                    label,
                    options.rank,
                    downloader.clone(),
                    indexer.clone(),
                    denylist.clone(),
                    config.upload_concurrency,
                    shard_source_control.as_ref().map(|sc| sc as &dyn SourceControl),
                    iteration_start,
                    options.time_limit,
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(subdir = %subdir, label = %label, error = %e, "sync failed for this pair, skipping it this iteration");
                        continue;
                    }
                };
                info!(subdir = %subdir, label = %label, added = outcome.added, merged = outcome.label_merged, "synced subdir/label");

                if !owns_pair {
                    continue;
                }

                let attempt = build_pair(
                    &store,
                    config.patch_set_path.as_deref(),
                    &subdir,
                    label,
                    &outcome,
                    repatch_all,
                    &mut patched_docs,
                    &mut link_table,
                )
                .or_else(|e| {
                    warn!(subdir = %subdir, label = %label, error = %e, "rebuild failed, retrying in full-rebuild mode");
                    build_pair(
                        &store,
                        config.patch_set_path.as_deref(),
                        &subdir,
                        label,
                        &outcome,
                        true,
                        &mut patched_docs,
                        &mut link_table,
                    )
                });

                match attempt {
                    Ok(artifacts) => pending_uploads.extend(artifacts),
                    Err(e) => warn!(subdir = %subdir, label = %label, error = %e, "rebuild failed again, leaving this pair unpublished this iteration"),
                }
            }

            if options.rank.owns_loop_index(label_idx) {
                match build_channeldata(&store, label) {
                    Ok((document, uploads)) => {
                        last_channeldata.insert(label.as_str().to_string(), document);
                        pending_uploads.extend(uploads);
                    }
                    Err(e) => warn!(label = %label, error = %e, "channeldata fold failed, skipping publish for this label this iteration"),
                }
            }
        }

        if options.make_releases && !pending_uploads.is_empty() {
            match &release_store {
                Some(release_store) => {
                    if let Err(e) = publish_iteration(
                        release_store.as_ref(),
                        pending_uploads,
                        &mut link_table,
                        shard_rev.clone(),
                        patch_rev.clone(),
                    )
                    .await
                    {
                        warn!(error = %e, "failed to publish this iteration's release");
                    }
                }
                None => warn!("--make-releases set but no release credentials configured, skipping publish"),
            }
        } else {
            link_table.current_shas.shard_store = shard_rev;
            link_table.current_shas.patch_set = patch_rev;
        }

        if start.elapsed() >= options.time_limit {
            break;
        }

        let elapsed_this_iteration = iteration_start.elapsed();
        let min_update_time = Duration::from_secs(config.min_update_time_secs);
        if elapsed_this_iteration < min_update_time {
            tokio::time::sleep(min_update_time - elapsed_this_iteration).await;
        }
    }

    if options.debug {
        dump_debug_state(&patched_docs, &last_channeldata, &link_table)?;
    }

    Ok(())
}

/// Loads the Link Table to resume from. `None` when releases aren't
/// requested, or when no release credentials are configured: the loop
/// then runs as a local sync/rebuild with no cross-iteration state beyond
/// what `patched_docs` keeps in memory. A missing prior table with
/// releases enabled is only safe to treat as "start empty" when the
/// operator has explicitly allowed it.
async fn load_starting_link_table(
    options: &RunOptions,
    release_store: &Option<Arc<dyn ReleaseStore>>,
) -> Result<LinkTable, RepoError> {
    let Some(release_store) = release_store else { return Ok(LinkTable::new()) };
    if !options.make_releases {
        return Ok(LinkTable::new());
    }
    match release_store.latest_links().await? {
        Some(table) => Ok(table),
        None if options.allow_unsafe => {
            warn!("no prior Link Table found; starting from empty state because --allow-unsafe was given");
            Ok(LinkTable::new())
        }
        None => Err(RepoError::Fatal(
            "releases are enabled but no prior Link Table exists; pass --allow-unsafe to start from empty state".to_string(),
        )),
    }
}

/// Loads the denylist from `path` if given, warning and falling back to an
/// empty one on a read/parse failure rather than aborting the run.
pub(crate) fn load_denylist(path: Option<&str>) -> PackageDenylist {
    match path {
        Some(path) => match PackageDenylist::from_file(std::path::Path::new(path)) {
            Ok(denylist) => denylist,
            Err(e) => {
                warn!(path, error = %e, "failed to load denylist, running with an empty one");
                PackageDenylist::default()
            }
        },
        None => PackageDenylist::default(),
    }
}

fn read_shards(store: &ShardStore, subdir: &Subdir) -> Result<Vec<Shard>, RepoError> {
    store
        .list_subdir(subdir)?
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)?;
            Ok(serde_json::from_slice(&bytes)?)
        })
        .collect()
}

fn json_and_bz2(stem: &str, artifact: &EncodedArtifact) -> [(String, Vec<u8>); 2] {
    [(format!("{stem}.json"), artifact.json.clone()), (format!("{stem}.json.bz2"), artifact.bz2.clone())]
}

/// Rebuilds one `(subdir, label)` pair's raw/patched/current repodata and
/// returns the artifacts that need (re-)publishing this iteration.
///
/// Raw is not republished unless this sync actually changed something for
/// the pair, or it has never been published before — matching the "patch
/// mode" contract where `repodata_from_packages_*` stays untouched across
/// a patch-only update. Patched/current republish whenever raw changed or
/// the patch set's revision moved, since either invalidates them.
#[allow(clippy::too_many_arguments)]
fn build_pair(
    store: &ShardStore,
    patch_set_path: Option<&str>,
    subdir: &Subdir,
    label: &Label,
    outcome: &SyncOutcome,
    full_rebuild: bool,
    patched_docs: &mut HashMap<(String, String), RepoDataDocument>,
    link_table: &mut LinkTable,
) -> Result<Vec<(String, Vec<u8>)>, RepoError> {
    let shards = read_shards(store, subdir)?;
    let raw = fold_repodata(&shards, subdir, label, link_table);
    link_table.record_label(label.as_str());

    let key = (subdir.as_str().to_string(), label.as_str().to_string());
    let patched = patched_docs.entry(key.clone()).or_insert_with(|| RepoDataDocument::new(subdir.as_str()));

    let patch_module: Box<dyn PatchModule> = match patch_set_path {
        Some(patch_repo) => FilePatchModule::load_for_subdir(Path::new(patch_repo), subdir)?,
        None => Box::new(NoopPatch),
    };
    apply_patch(&raw, patched, patch_module.as_ref(), full_rebuild);
    let current = derive_current_repodata(patched);

    let pair_changed = outcome.added > 0 || outcome.label_merged > 0;
    let raw_name = format!("repodata_from_packages_{}_{}", subdir.as_str(), label.as_str());
    let patched_name = format!("repodata_{}_{}", subdir.as_str(), label.as_str());
    let current_name = format!("current_repodata_{}_{}", subdir.as_str(), label.as_str());

    let raw_dirty = pair_changed || link_table.latest_artifact_url(&format!("{raw_name}.json")).is_none();
    let patched_dirty =
        raw_dirty || full_rebuild || link_table.latest_artifact_url(&format!("{patched_name}.json")).is_none();

    let mut uploads = Vec::new();
    if raw_dirty {
        uploads.extend(json_and_bz2(&raw_name, &encode(&raw)?));
    }
    if patched_dirty {
        uploads.extend(json_and_bz2(&patched_name, &encode(&*patched)?));
        uploads.extend(json_and_bz2(&current_name, &encode(&current)?));
    }
    Ok(uploads)
}

/// Folds every shard carrying `label`, across every subdir, into that
/// label's channeldata document. Reads straight from the shared shard
/// store rather than only the subdirs this rank owns, since publishing
/// channeldata is assigned to one rank per label independent of which
/// rank publishes which subdir's repodata.
fn build_channeldata(store: &ShardStore, label: &Label) -> Result<(ChannelDataDocument, Vec<(String, Vec<u8>)>), RepoError> {
    let mut shards = Vec::new();
    for subdir_name in CONDA_FORGE_SUBDIRS {
        shards.extend(read_shards(store, &Subdir::new(*subdir_name))?);
    }
    let document = fold_channeldata(&shards, label);
    let artifact = encode(&document)?;
    let name = format!("channeldata_{}.json", label.as_str());
    Ok((document.clone(), vec![(name, artifact.json)]))
}

/// Publishes one draft release for this iteration: uploads every pending
/// artifact through a fixed-size pool, records each under its Link Table
/// entry, stamps `current-shas`/`updated_at`, uploads `links.json.bz2`
/// last, then flips the release to published and garbage-collects any
/// release no longer referenced.
async fn publish_iteration(
    release_store: &dyn ReleaseStore,
    uploads: Vec<(String, Vec<u8>)>,
    link_table: &mut LinkTable,
    shard_rev: Option<String>,
    patch_rev: Option<String>,
) -> Result<(), RepoError> {
    let tag = chrono::Utc::now().format("%Y.%m.%d.%H.%M.%S").to_string();
    let existing = release_store.get_or_create_release(&tag).await?;

    let semaphore = Arc::new(Semaphore::new(UPLOAD_CONCURRENCY));
    let mut in_flight = FuturesUnordered::new();
    for (name, bytes) in uploads {
        let permit = semaphore.clone().acquire_owned().await.map_err(transient)?;
        let existing = &existing;
        let tag = tag.clone();
        in_flight.push(async move {
            let _permit = permit;
            let result: Result<Asset, RepoError> = upload_idempotent(release_store, &tag, existing, &name, &bytes).await;
            (name, result)
        });
    }
    let mut uploaded = Vec::new();
    while let Some((name, result)) = in_flight.next().await {
        uploaded.push((name, result?));
    }
    for (name, asset) in uploaded {
        link_table.record_artifact(name, asset.download_url);
    }

    link_table.current_shas.shard_store = shard_rev;
    link_table.current_shas.patch_set = patch_rev;
    link_table.updated_at = chrono::Utc::now().to_rfc3339();

    let links_artifact = encode(link_table)?;
    let links_asset = upload_idempotent(release_store, &tag, &existing, "links.json.bz2", &links_artifact.bz2).await?;
    link_table.record_artifact("links.json.bz2", links_asset.download_url);

    release_store.publish(&tag).await?;

    match release_store.list_release_tags().await {
        Ok(tags) => {
            let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
            for stale in releases_to_delete(&tag_refs, link_table) {
                if let Err(e) = release_store.delete_release(stale).await {
                    warn!(tag = stale, error = %e, "failed to delete stale release during GC");
                }
            }
        }
        Err(e) => warn!(error = %e, "failed to list releases for GC"),
    }

    Ok(())
}

/// Writes the loop's in-memory state to the working directory, for
/// `--debug` runs that want to inspect a snapshot without publishing it.
fn dump_debug_state(
    patched_docs: &HashMap<(String, String), RepoDataDocument>,
    channeldata: &HashMap<String, ChannelDataDocument>,
    link_table: &LinkTable,
) -> Result<(), RepoError> {
    let repodata_dump: HashMap<String, &RepoDataDocument> =
        patched_docs.iter().map(|((subdir, label), doc)| (format!("{subdir}/{label}"), doc)).collect();
    std::fs::write("debug_repodata.json", serde_json::to_vec_pretty(&repodata_dump)?)?;
    std::fs::write("debug_channeldata.json", serde_json::to_vec_pretty(channeldata)?)?;
    std::fs::write("debug_current_shas.json", serde_json::to_vec_pretty(&link_table.current_shas)?)?;
    info!("debug mode: dumped repodata/channeldata/current-shas snapshots to the working directory");
    Ok(())
}
