//! The Repodata Builder: folds shards into repodata and channeldata
//! documents, applies the pluggable patch interface, derives
//! `current_repodata.json`, and sweeps undistributable packages.

pub mod artifact;
pub mod channeldata;
pub mod current_repodata;
pub mod fold;
pub mod patch;
pub mod undistrib;

pub use artifact::{encode, EncodedArtifact};
pub use channeldata::fold_channeldata;
pub use current_repodata::derive_current_repodata;
pub use fold::fold_repodata;
pub use patch::{apply_patch, FilePatchModule, NoopPatch, PatchModule};
pub use undistrib::{needs_sweep, package_name_from_filename, sweep_shard};
