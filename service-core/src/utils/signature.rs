use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute a hex-encoded HMAC-SHA256 of `payload` keyed by `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    if secret.is_empty() {
        return Err(anyhow::anyhow!("Signing secret is empty"));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare two signature strings without leaking where they differ.
///
/// Length mismatch returns early; the length of a hex digest is public.
pub fn constant_time_eq(expected: &str, provided: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.as_bytes();

    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

/// Verify a hex-encoded HMAC-SHA256 signature using constant-time comparison.
///
/// Errors only when the secret itself is unusable.
pub fn verify_hmac_sha256_hex(
    secret: &str,
    payload: &str,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    Ok(constant_time_eq(&expected, signature))
}
