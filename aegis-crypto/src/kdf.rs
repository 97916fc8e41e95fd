//! Key derivation for per-store encryption keys (spec §4.2).
//!
//! `scrypt(secret, salt = utf8(store-name), N=2^14, r=8, p=1, len=32)`.

use aegis_core::ConfigError;
use scrypt::{scrypt, Params};

pub const MIN_SECRET_LEN: usize = 32;

/// Derive the 32-byte AES-256 key for `store_name` from the process-wide
/// secret. The helper refuses to run if `secret` is shorter than 32 bytes.
pub fn derive_store_key(secret: &str, store_name: &str) -> Result<[u8; 32], ConfigError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::SecretTooShort {
            field: "security.encryption_key".to_string(),
            min_bytes: MIN_SECRET_LEN,
            got_bytes: secret.len(),
        });
    }
    let params = Params::new(14, 8, 1, 32).map_err(|e| ConfigError::InvalidValue {
        field: "scrypt_params".to_string(),
        reason: e.to_string(),
    })?;
    let mut key = [0u8; 32];
    scrypt(secret.as_bytes(), store_name.as_bytes(), &params, &mut key).map_err(|e| {
        ConfigError::InvalidValue {
            field: "scrypt_derive".to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_secret() {
        let err = derive_store_key("too-short", "vector-store").unwrap_err();
        assert!(matches!(err, ConfigError::SecretTooShort { .. }));
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let secret = "0123456789abcdef0123456789abcdef";
        let a = derive_store_key(secret, "vector-store").unwrap();
        let b = derive_store_key(secret, "vector-store").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differs_by_store_name() {
        let secret = "0123456789abcdef0123456789abcdef";
        let a = derive_store_key(secret, "vector-store").unwrap();
        let b = derive_store_key(secret, "audit-log").unwrap();
        assert_ne!(a, b);
    }
}
