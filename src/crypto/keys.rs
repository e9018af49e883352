//! Audit key derivation using PBKDF2-HMAC-SHA512
//!
//! The auditor's long-lived key is derived from an operator passphrase.
//! The iteration count is configurable; 100 000 is the default.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

/// Default PBKDF2 iteration count
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Length of a derived audit key in bytes
pub const AUDIT_KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyDerivationError {
    #[error("Iteration count must be at least 1")]
    ZeroIterations,
    #[error("Salt must not be empty")]
    EmptySalt,
}

/// Key derived from the auditor's passphrase
/// Automatically zeroed when dropped
#[derive(ZeroizeOnDrop)]
pub struct AuditKey {
    key: [u8; AUDIT_KEY_LEN],
}

impl AuditKey {
    /// Get raw key bytes (use carefully)
    pub fn as_bytes(&self) -> &[u8; AUDIT_KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for AuditKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuditKey(..)")
    }
}

/// Derive a fixed-length audit key from a passphrase
pub fn derive_audit_key(
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<AuditKey, KeyDerivationError> {
    if iterations == 0 {
        return Err(KeyDerivationError::ZeroIterations);
    }
    if salt.is_empty() {
        return Err(KeyDerivationError::EmptySalt);
    }

    let mut key = [0u8; AUDIT_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), salt, iterations, &mut key);

    Ok(AuditKey { key })
}

/// Generate a new random salt for key derivation
pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_deterministic() {
        let salt = [7u8; 16];
        let key1 = derive_audit_key("test", &salt, 1_000).unwrap();
        let key2 = derive_audit_key("test", &salt, 1_000).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_inputs_change_key() {
        let salt = generate_salt();
        let base = derive_audit_key("test", &salt, 1_000).unwrap();

        let other_pass = derive_audit_key("other", &salt, 1_000).unwrap();
        let other_iters = derive_audit_key("test", &salt, 1_001).unwrap();
        let other_salt = derive_audit_key("test", &[1u8; 16], 1_000).unwrap();

        assert_ne!(base.as_bytes(), other_pass.as_bytes());
        assert_ne!(base.as_bytes(), other_iters.as_bytes());
        assert_ne!(base.as_bytes(), other_salt.as_bytes());
    }

    #[test]
    fn test_rejects_degenerate_parameters() {
        assert_eq!(
            derive_audit_key("test", &[1u8; 16], 0).unwrap_err(),
            KeyDerivationError::ZeroIterations
        );
        assert_eq!(
            derive_audit_key("test", &[], 10).unwrap_err(),
            KeyDerivationError::EmptySalt
        );
    }
}
