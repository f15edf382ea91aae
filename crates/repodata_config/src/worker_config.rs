use std::env;

/// Credentials and tunables the Worker Loop needs. Fields are `None` when
/// the corresponding environment variable is absent, which disables the
/// operation that needs it rather than failing at startup — the same
/// degrade-gracefully posture `repoworker.py`'s `main()` takes when run
/// without upload credentials in `--debug` mode.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub github_token: Option<String>,
    pub release_owner_repo: Option<String>,
    pub shards_repo_path: Option<String>,
    pub min_update_time_secs: u64,
    pub upload_concurrency: usize,
    /// Non-main labels to mirror alongside `main`, e.g. `"rc,broken"`.
    /// Conda-forge's channel carries a handful of these; there is no fixed
    /// enumeration, so the operator names the ones they want mirrored.
    pub extra_labels: Vec<String>,
    /// Path to the `{"unindexable": [...], "undistributable": [...]}`
    /// denylist bundle. `None` runs with an empty denylist.
    pub denylist_path: Option<String>,
    /// Working copy of the patch-set repository, holding a
    /// `<subdir>/patch_instructions.json` per subdir. `None` runs with no
    /// patches applied.
    pub patch_set_path: Option<String>,
}

impl WorkerConfig {
    pub fn from_env() -> WorkerConfig {
        WorkerConfig {
            github_token: env::var("GITHUB_TOKEN").ok(),
            release_owner_repo: env::var("REPODATA_RELEASE_REPO").ok(),
            shards_repo_path: env::var("REPODATA_SHARDS_PATH").ok(),
            min_update_time_secs: env::var("REPODATA_MIN_UPDATE_TIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            upload_concurrency: env::var("REPODATA_UPLOAD_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            extra_labels: env::var("REPODATA_EXTRA_LABELS")
                .ok()
                .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
                .unwrap_or_default(),
            denylist_path: env::var("REPODATA_DENYLIST_PATH").ok(),
            patch_set_path: env::var("REPODATA_PATCH_SET_PATH").ok(),
        }
    }
}

/// Configuration for the Redirect Frontend.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub release_owner_repo: String,
    pub github_token: Option<String>,
    pub update_links_secret: Option<String>,
    pub bind_addr: String,
}

impl RedirectConfig {
    pub fn from_env() -> RedirectConfig {
        RedirectConfig {
            release_owner_repo: env::var("REPODATA_RELEASE_REPO")
                .unwrap_or_else(|_| "conda-forge/releases".to_string()),
            github_token: env::var("GITHUB_TOKEN").ok(),
            update_links_secret: env::var("UPDATE_LINKS_SECRET").ok(),
            bind_addr: env::var("REPODATA_REDIRECT_BIND")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }

    /// Splits `release_owner_repo` ("owner/repo") into its two parts,
    /// falling back to `conda-forge/releases` if it isn't in that shape.
    pub fn owner_repo(&self) -> (&str, &str) {
        self.release_owner_repo
            .split_once('/')
            .unwrap_or(("conda-forge", "releases"))
    }
}
