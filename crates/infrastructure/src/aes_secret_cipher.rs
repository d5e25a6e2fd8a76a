//! AES-256-GCM sealing for secrets at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use jit_core::{AppError, AppResult};

const NONCE_LENGTH: usize = 12;

/// AES-256-GCM cipher sealing issued credentials and kubeconfigs.
#[derive(Clone)]
pub struct AesSecretCipher {
    cipher: Aes256Gcm,
}

impl AesSecretCipher {
    /// Creates a cipher from a 32-byte key.
    #[must_use]
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key_bytes.into()),
        }
    }

    /// Creates a cipher with a random key that lives as long as the process.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            cipher: Aes256Gcm::new(&Aes256Gcm::generate_key(OsRng)),
        }
    }

    /// Creates a cipher from a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key.trim())
            .map_err(|error| AppError::Fatal(format!("storage.encryptionKey is not hex: {error}")))?;
        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            AppError::Fatal(
                "storage.encryptionKey must be exactly 32 bytes (64 hex chars)".to_owned(),
            )
        })?;

        Ok(Self::new(&key))
    }

    /// Seals `plaintext`, prefixing the random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|error| AppError::Internal(format!("failed to seal secret: {error}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Opens a value produced by [`AesSecretCipher::seal`].
    pub fn open(&self, sealed: &[u8]) -> AppResult<Vec<u8>> {
        if sealed.len() < NONCE_LENGTH {
            return Err(AppError::Internal(
                "sealed secret too short: missing nonce".to_owned(),
            ));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let nonce_array: [u8; NONCE_LENGTH] = nonce_bytes
            .try_into()
            .map_err(|_| AppError::Internal("nonce must be exactly 12 bytes".to_owned()))?;

        self.cipher
            .decrypt(&Nonce::from(nonce_array), ciphertext)
            .map_err(|error| AppError::Internal(format!("failed to open secret: {error}")))
    }
}
