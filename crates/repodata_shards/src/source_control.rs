use std::path::{Path, PathBuf};

use repodata_config::{retry::write_retry_policy, transient, RepoError};
use retry_policies::{RetryDecision, RetryPolicy};
use tokio::process::Command;

/// The pull-stage-push-with-retry protocol spec.md calls for in place of
/// ad hoc `git` subprocess calls scattered through the original
/// `anaconda_sync.py`/`releases.py`/`remove_undistrib.py` scripts.
#[async_trait::async_trait]
pub trait SourceControl: Send + Sync {
    async fn pull(&self) -> Result<(), RepoError>;
    async fn stage(&self, paths: &[PathBuf]) -> Result<(), RepoError>;
    async fn commit(&self, message: &str) -> Result<(), RepoError>;
    async fn push(&self) -> Result<(), RepoError>;

    /// The working copy's current revision, used to detect whether
    /// anything changed upstream since the last Worker Loop iteration.
    async fn current_rev(&self) -> Result<String, RepoError>;

    /// Commits staged changes and pushes, retrying the whole
    /// pull-commit-push cycle on conflict, matching `anaconda_sync.py::_push_repo`.
    async fn push_with_retry(&self, message: &str) -> Result<(), RepoError> {
        let policy = write_retry_policy();
        let start = std::time::SystemTime::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.commit(message).await?;
            match self.push().await {
                Ok(()) => return Ok(()),
                Err(e) => match policy.should_retry(start, attempt) {
                    RetryDecision::Retry { execute_after } => {
                        tracing::warn!(attempt, error = %e, "push failed, pulling and retrying");
                        let delay = execute_after
                            .duration_since(std::time::SystemTime::now())
                            .unwrap_or_default();
                        tokio::time::sleep(delay).await;
                        self.pull().await?;
                    }
                    RetryDecision::DoNotRetry => return Err(e),
                },
            }
        }
    }
}

/// Drives a local working copy with the `git` binary, matching the shell
/// commands `make_or_get_commit`/`_push_repo`/`_write_shards` ran via
/// `subprocess.run`.
pub struct GitSourceControl {
    working_dir: PathBuf,
}

impl GitSourceControl {
    pub fn new(working_dir: impl Into<PathBuf>) -> GitSourceControl {
        GitSourceControl { working_dir: working_dir.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<(), RepoError> {
        self.run_capturing(args).await.map(|_| ())
    }

    async fn run_capturing(&self, args: &[&str]) -> Result<String, RepoError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await
            .map_err(|e| transient(e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(transient(format!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )))
        }
    }
}

#[async_trait::async_trait]
impl SourceControl for GitSourceControl {
    async fn pull(&self) -> Result<(), RepoError> {
        self.run(&["pull", "--no-edit"]).await
    }

    async fn stage(&self, paths: &[PathBuf]) -> Result<(), RepoError> {
        for path in paths {
            let s = path.to_string_lossy();
            self.run(&["add", s.as_ref()]).await?;
        }
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<(), RepoError> {
        let suffixed = format!("{message} [ci skip] [cf admin skip] ***NO_CI***");
        self.run(&["commit", "--allow-empty", "-m", &suffixed]).await
    }

    async fn push(&self) -> Result<(), RepoError> {
        self.run(&["push"]).await
    }

    async fn current_rev(&self) -> Result<String, RepoError> {
        self.run_capturing(&["rev-parse", "HEAD"]).await
    }
}

impl GitSourceControl {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
