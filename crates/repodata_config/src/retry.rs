use std::time::Duration;

use retry_policies::policies::{ExponentialBackoff, ExponentialBackoffTimed};
use retry_policies::Jitter;

/// Used around individual package downloads and metadata reads: short
/// backoff, bounded to a handful of attempts.
pub fn download_retry_policy() -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(10))
        .jitter(Jitter::Bounded)
        .build_with_max_retries(5)
}

/// Used around batch writes: shard pushes, release publication, Link
/// Table uploads. Allows a much longer total budget since these retries
/// are racing against other workers rather than a single flaky host.
pub fn write_retry_policy() -> ExponentialBackoffTimed {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_secs(10), Duration::from_secs(90))
        .jitter(Jitter::Bounded)
        .build_with_total_retry_duration(Duration::from_secs(600))
}
