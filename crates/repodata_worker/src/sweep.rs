use repodata_config::RepoError;
use repodata_core::{needs_sweep, package_name_from_filename, sweep_shard};
use repodata_shards::ShardStore;
use repodata_sync::Rank;
use repodata_types::{PackageDenylist, Shard, ShardKey, Subdir, CONDA_FORGE_SUBDIRS};
use tracing::info;

/// Walks every shard this rank owns and rewrites the ones naming a
/// newly-undistributable package back to their upstream URL, mirroring
/// `remove_undistrib.py::remove_undistributable`'s per-rank sweep.
pub fn run(store: &ShardStore, denylist: &PackageDenylist, rank: Rank) -> Result<usize, RepoError> {
    let mut swept = 0;

    for subdir_name in CONDA_FORGE_SUBDIRS {
        let subdir = Subdir::new(*subdir_name);
        for path in store.list_subdir(&subdir)? {
            let bytes = std::fs::read(&path)?;
            let shard: Shard = serde_json::from_slice(&bytes)?;

            let key = ShardKey::new(&shard.subdir, &shard.package);
            if !rank.owns_package(&key) {
                continue;
            }

            let Some(package_name) = package_name_from_filename(&shard.package) else { continue };
            if !needs_sweep(&shard, denylist, package_name) {
                continue;
            }

            let swept_shard = sweep_shard(shard, denylist);
            store.write(&swept_shard)?;
            swept += 1;
            info!(package = %swept_shard.package, subdir = %subdir, "swept undistributable shard");
        }
    }

    Ok(swept)
}
