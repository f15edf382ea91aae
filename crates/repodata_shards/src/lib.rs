//! The Shard Store: persistence and migration for content-addressed
//! per-package shards, plus the VCS protocol used to commit and push them.

pub mod source_control;
pub mod store;

pub use source_control::{GitSourceControl, SourceControl};
pub use store::ShardStore;
