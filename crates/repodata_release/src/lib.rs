//! The Release Store: drafts, publishes, and garbage-collects versioned
//! release artifacts (GitHub-Release shaped), grounded on `releases.py`'s
//! `get_or_make_release`/`upload_asset` idempotence and
//! `repoworker.py::_delete_old_releases`'s GC sweep.

pub mod asset;
pub mod github;
pub mod store;

pub use asset::{Asset, ContentType};
pub use github::GithubReleaseStore;
pub use store::{releases_to_delete, upload_idempotent, ReleaseStore};
