//! HMAC helpers for webhook verification.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub fn sign(key: &[u8], message: &[u8]) -> Result<Vec<u8>, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::Config(format!("invalid webhook key: {}", e)))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of `signature` against the HMAC of `message`.
pub fn verify(key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GatewayError::Config(format!("invalid webhook key: {}", e)))?;
    mac.update(message);
    Ok(mac.verify_slice(signature).is_ok())
}

/// Rejects signed timestamps outside `tolerance_secs` of `now`.
pub fn check_timestamp(timestamp: &str, now: i64, tolerance_secs: u64) -> Result<(), GatewayError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| GatewayError::InvalidSignature("unparseable timestamp".into()))?;
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside tolerance".into(),
        ));
    }
    Ok(())
}

/// Key bytes for a `whsec_`-prefixed base64 secret; other secrets are used raw.
pub fn secret_bytes(secret: &str) -> Vec<u8> {
    match secret.strip_prefix("whsec_") {
        Some(encoded) => STANDARD
            .decode(encoded)
            .unwrap_or_else(|_| encoded.as_bytes().to_vec()),
        None => secret.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_own_signature_only() {
        let sig = sign(b"key", b"payload").unwrap();
        assert!(verify(b"key", b"payload", &sig).unwrap());
        assert!(!verify(b"key", b"tampered", &sig).unwrap());
        assert!(!verify(b"other", b"payload", &sig).unwrap());
    }

    #[test]
    fn timestamp_tolerance() {
        assert!(check_timestamp("1000", 1200, 300).is_ok());
        assert!(check_timestamp("1000", 1400, 300).is_err());
        assert!(check_timestamp("1400", 1000, 300).is_err());
        assert!(check_timestamp("soon", 1000, 300).is_err());
    }

    #[test]
    fn whsec_secrets_are_base64_decoded() {
        assert_eq!(secret_bytes("whsec_c2VjcmV0"), b"secret".to_vec());
        assert_eq!(secret_bytes("plain"), b"plain".to_vec());
    }
}
