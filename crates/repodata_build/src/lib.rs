//! The Shard Builder: downloads a package, verifies its checksum, runs the
//! external indexer over it, and projects the result into a [`repodata_types::Shard`].

pub mod builder;
pub mod checksum;
pub mod downloader;
pub mod indexer;

pub use builder::build_shard;
pub use downloader::{HttpDownloader, PackageDownloader};
pub use indexer::{IndexOutput, Indexer, SubprocessIndexer};
