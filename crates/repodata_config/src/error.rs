use std::fmt;

/// Coarse classification consumed by the shared retry wrapper. Every
/// fallible operation that touches the network, a subprocess, or another
/// process's state reports one of these instead of a bare error, so retry
/// policy can be decided in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Worth retrying with backoff: connection resets, 5xx responses,
    /// optimistic-concurrency conflicts.
    Transient,
    /// Worth retrying, but only after honoring a longer, provider-supplied
    /// delay (e.g. GitHub's API rate limit).
    RateLimited,
    /// A downloaded artifact didn't match its expected digest. Retryable,
    /// but should not be silently downgraded to `Transient` since repeated
    /// mismatches likely mean the source, not the network, is bad.
    ChecksumMismatch,
    /// The package is known not to be indexable; this is an expected,
    /// permanent condition handled by falling back to a null shard rather
    /// than retried.
    Unindexable,
    /// Internal state disagrees with itself (e.g. a referenced shard is
    /// missing). Not retryable; surfaced to the operator.
    Inconsistent,
    /// Unrecoverable: the process should stop.
    Fatal,
}

impl Severity {
    pub fn is_retryable(self) -> bool {
        matches!(self, Severity::Transient | Severity::RateLimited | Severity::ChecksumMismatch)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("transient I/O or network error: {0}")]
    Transient(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("package {0} is on the unindexable list")]
    Unindexable(String),

    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl RepoError {
    pub fn severity(&self) -> Severity {
        match self {
            RepoError::Transient(_) | RepoError::Io(_) | RepoError::Http(_) => Severity::Transient,
            RepoError::RateLimited { .. } => Severity::RateLimited,
            RepoError::ChecksumMismatch { .. } => Severity::ChecksumMismatch,
            RepoError::Unindexable(_) => Severity::Unindexable,
            RepoError::Inconsistent(_) | RepoError::Serde(_) => Severity::Inconsistent,
            RepoError::Fatal(_) => Severity::Fatal,
        }
    }
}

/// Shorthand used by leaf call sites that only need a string.
pub fn transient(msg: impl fmt::Display) -> RepoError {
    RepoError::Transient(msg.to_string())
}

pub type Result<T> = std::result::Result<T, RepoError>;
