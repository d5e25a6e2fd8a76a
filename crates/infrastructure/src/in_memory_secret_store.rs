use std::collections::HashMap;

use async_trait::async_trait;
use jit_application::SecretStore;
use jit_core::AppResult;
use tokio::sync::RwLock;

use crate::aes_secret_cipher::AesSecretCipher;

/// In-memory secret store sealing every value with AES-GCM.
pub struct InMemorySecretStore {
    cipher: AesSecretCipher,
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySecretStore {
    /// Creates an empty store sealing with `cipher`.
    #[must_use]
    pub fn new(cipher: AesSecretCipher) -> Self {
        Self {
            cipher,
            values: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn put(&self, key: &str, value: &[u8]) -> AppResult<()> {
        let sealed = self.cipher.seal(value)?;
        self.values.write().await.insert(key.to_owned(), sealed);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        match self.values.read().await.get(key) {
            Some(sealed) => self.cipher.open(sealed).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
