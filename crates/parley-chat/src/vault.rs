use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Encryption key must be base64 of exactly 32 bytes: {0}")]
    InvalidKey(String),

    #[error("Failed to encrypt credential")]
    Encryption,

    #[error("Stored credential could not be decrypted")]
    Decryption,
}

/// Seals and opens per-user API keys with AES-256-GCM.
///
/// Sealed form is base64 of `nonce || ciphertext`, with a fresh random
/// nonce for every seal.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; 32],
}

impl CredentialVault {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build from the base64 configuration value
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| VaultError::InvalidKey(format!("got {} bytes", b.len())))?;
        Ok(Self { key })
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, VaultError> {
        let data = STANDARD.decode(sealed).map_err(|_| VaultError::Decryption)?;
        if data.len() <= NONCE_LEN {
            return Err(VaultError::Decryption);
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let nonce = GenericArray::from_slice(&data[..NONCE_LEN]);
        let plaintext = cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| VaultError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault").field("key", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let vault = CredentialVault::from_bytes([7u8; 32]);
        let sealed = vault.seal("sk-live-abc").unwrap();

        assert!(!sealed.contains("sk-live-abc"));
        assert_eq!(vault.open(&sealed).unwrap(), "sk-live-abc");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let vault = CredentialVault::from_bytes([7u8; 32]);
        assert_ne!(vault.seal("same").unwrap(), vault.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = CredentialVault::from_bytes([1u8; 32]).seal("secret").unwrap();
        let other = CredentialVault::from_bytes([2u8; 32]);
        assert_eq!(other.open(&sealed), Err(VaultError::Decryption));
        assert_eq!(other.open("not base64!"), Err(VaultError::Decryption));
    }

    #[test]
    fn test_from_base64_validates_length() {
        let good = STANDARD.encode([9u8; 32]);
        assert!(CredentialVault::from_base64(&good).is_ok());

        let short = STANDARD.encode([9u8; 16]);
        assert!(matches!(
            CredentialVault::from_base64(&short),
            Err(VaultError::InvalidKey(_))
        ));
        assert!(CredentialVault::from_base64("%%%").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let vault = CredentialVault::from_bytes([42u8; 32]);
        assert!(format!("{:?}", vault).contains("redacted"));
    }
}
