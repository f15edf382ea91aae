//! Upstream Sync: reconciles the shard store against the upstream
//! package catalog, partitioned across cooperating ranks.

pub mod catalog;
pub mod rank;
pub mod reconcile;

pub use catalog::{Catalog, HttpCatalog};
pub use rank::Rank;
pub use reconcile::{sync_subdir_label, SyncOutcome};
