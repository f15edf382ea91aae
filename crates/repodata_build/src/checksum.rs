use md5::{Digest, Md5};
use repodata_config::RepoError;
use subtle::ConstantTimeEq;

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Compares two hex digests in constant time, the way `hmac.compare_digest`
/// does in `shards.py::make_repodata_shard_noretry`.
pub fn digests_match(expected_hex: &str, actual_hex: &str) -> bool {
    expected_hex.as_bytes().ct_eq(actual_hex.as_bytes()).into()
}

pub fn verify(name: &str, expected_hex: &str, actual_hex: &str) -> Result<(), RepoError> {
    if digests_match(expected_hex, actual_hex) {
        Ok(())
    } else {
        Err(RepoError::ChecksumMismatch {
            name: name.to_string(),
            expected: expected_hex.to_string(),
            actual: actual_hex.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_digests_pass() {
        let d = md5_hex(b"hello");
        assert!(verify("pkg", &d, &d).is_ok());
    }

    #[test]
    fn mismatched_digests_error() {
        let err = verify("pkg", "aaaa", "bbbb").unwrap_err();
        assert_eq!(err.severity(), repodata_config::Severity::ChecksumMismatch);
    }
}
