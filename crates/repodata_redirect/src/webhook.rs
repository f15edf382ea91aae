use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;

/// Verifies a GitHub-style `X-Hub-Signature: sha1=<hex>` header against
/// `body` using the shared secret, comparing in constant time so a partial
/// match can't leak information about how much of the signature matched.
pub fn verify_signature(secret: &str, signature_header: &str, body: &[u8]) -> bool {
    let Some(given_hex) = signature_header.strip_prefix("sha1=") else {
        return false;
    };

    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected_hex = hex::encode(mac.finalize().into_bytes());

    expected_hex.as_bytes().ct_eq(given_hex.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let body = b"{\"zen\":\"hello\"}";
        let header = sign("topsecret", body);
        assert!(verify_signature("topsecret", &header, body));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let header = sign("topsecret", body);
        assert!(!verify_signature("wrong", &header, body));
    }

    #[test]
    fn missing_prefix_fails() {
        assert!(!verify_signature("topsecret", "deadbeef", b"payload"));
    }
}
