use std::path::Path;

use repodata_config::{transient, RepoError};

/// The result of running the external package indexer over a directory
/// laid out as `<tmpdir>/<subdir>/<package>` plus an empty sibling
/// `noarch/` directory (the indexer always expects both to exist).
#[derive(Debug, Clone)]
pub struct IndexOutput {
    pub channeldata: serde_json::Value,
    pub repodata: serde_json::Value,
}

/// Runs the external indexer (`conda index` upstream) over a staged
/// directory. Modeled as a trait so tests can substitute a fake that
/// returns canned output instead of shelling out, matching the way the
/// rest of this pipeline treats indexing as an external collaborator.
#[async_trait::async_trait]
pub trait Indexer: Send + Sync {
    async fn index(&self, tmpdir: &Path) -> Result<IndexOutput, RepoError>;
}

pub struct SubprocessIndexer {
    binary: String,
}

impl SubprocessIndexer {
    pub fn new() -> SubprocessIndexer {
        SubprocessIndexer { binary: "conda".to_string() }
    }
}

impl Default for SubprocessIndexer {
    fn default() -> Self {
        SubprocessIndexer::new()
    }
}

#[async_trait::async_trait]
impl Indexer for SubprocessIndexer {
    async fn index(&self, tmpdir: &Path) -> Result<IndexOutput, RepoError> {
        let status = tokio::process::Command::new(&self.binary)
            .args(["index", "--no-progress"])
            .arg(tmpdir)
            .status()
            .await
            .map_err(|e| transient(e))?;
        if !status.success() {
            return Err(RepoError::Inconsistent(format!(
                "conda index exited with status {status}"
            )));
        }

        let channeldata_path = tmpdir.join("channeldata.json");
        let channeldata: serde_json::Value =
            serde_json::from_slice(&fs_err::read(channeldata_path)?)?;

        let repodata = find_subdir_repodata(tmpdir)?;
        Ok(IndexOutput { channeldata, repodata })
    }
}

fn find_subdir_repodata(tmpdir: &Path) -> Result<serde_json::Value, RepoError> {
    for entry in fs_err::read_dir(tmpdir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let candidate = path.join("repodata.json");
            if candidate.exists() {
                let value: serde_json::Value = serde_json::from_slice(&fs_err::read(candidate)?)?;
                return Ok(value);
            }
        }
    }
    Err(RepoError::Inconsistent(
        "indexer did not produce a repodata.json".to_string(),
    ))
}
