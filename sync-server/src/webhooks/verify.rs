//! Webhook signature verification (HMAC-SHA256)
//!
//! 平台对原始请求体做 HMAC-SHA256 并以 base64 形式放在
//! `X-Platform-Hmac-Sha256` 头中。验证必须使用常数时间比较，
//! 且在签名缺失、不匹配或密钥未配置时一律拒绝。

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::utils::AppError;

/// Verify a webhook signature against the raw request body
///
/// A rejected webhook is never queued or processed. The comparison goes
/// through `Mac::verify_slice`, which is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<(), AppError> {
    if secret.is_empty() || signature.is_empty() {
        return Err(AppError::WebhookUnauthorized);
    }

    let expected = BASE64
        .decode(signature)
        .map_err(|_| AppError::WebhookUnauthorized)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::WebhookUnauthorized)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| AppError::WebhookUnauthorized)
}

/// Compute the base64 signature the platform would send for `body`
///
/// Used by tests and by outbound verification tooling.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_0123456789";

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"id":42,"title":"Widget"}"#;
        let sig = sign(SECRET, body);
        assert!(verify_signature(SECRET, body, &sig).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let sig = sign(SECRET, b"original payload");
        assert!(verify_signature(SECRET, b"tampered payload", &sig).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let sig = sign("other_secret", body);
        assert!(verify_signature(SECRET, body, &sig).is_err());
    }

    #[test]
    fn missing_or_garbage_signature_is_rejected() {
        assert!(verify_signature(SECRET, b"payload", "").is_err());
        assert!(verify_signature(SECRET, b"payload", "not base64 !!!").is_err());
    }

    #[test]
    fn empty_secret_rejects_everything() {
        let body = b"payload";
        let sig = sign("", body);
        assert!(verify_signature("", body, &sig).is_err());
    }
}
