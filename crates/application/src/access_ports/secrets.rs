use async_trait::async_trait;
use jit_core::AppResult;

/// Opaque secret store owning issued credentials and kubeconfigs.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Writes or replaces one secret.
    async fn put(&self, key: &str, value: &[u8]) -> AppResult<()>;

    /// Reads one secret.
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Deletes one secret; deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> AppResult<()>;
}
