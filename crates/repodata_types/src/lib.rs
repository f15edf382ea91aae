//! Shared data model for the repodata mirror/build pipeline.

mod denylist;
mod links;
mod repodata;
mod shard;
mod subdir;
mod version;

pub use denylist::PackageDenylist;
pub use links::LinkTable;
pub use repodata::{
    normalize_timestamp_seconds, ChannelDataDocument, RepoDataDocument, RepoDataInfo,
    CHANNELDATA_VERSION, REPODATA_VERSION,
};
pub use shard::{Shard, ShardKey};
pub use subdir::{Label, Subdir, CONDA_FORGE_SUBDIRS};
pub use version::Version;
