//! Redis-backed per-key reconcile leases shared across replicas.

use async_trait::async_trait;
use jit_application::{ReconcileLease, ReconcileLeaseCoordinator};
use jit_core::{AppError, AppResult};
use redis::Script;
use redis::aio::MultiplexedConnection;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of reconcile lease coordination.
#[derive(Clone)]
pub struct RedisReconcileLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisReconcileLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a client for `url`.
    pub fn from_url(url: &str, key_prefix: impl Into<String>) -> AppResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|error| AppError::Fatal(format!("invalid redis.url: {error}")))?;
        Ok(Self::new(client, key_prefix))
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Transient(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl ReconcileLeaseCoordinator for RedisReconcileLeaseCoordinator {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcileLease>> {
        if key.trim().is_empty() || holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "reconcile lease key and holder_id must not be empty".to_owned(),
            ));
        }
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "reconcile lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(self.key_for(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Transient(format!("failed to acquire reconcile lease: {error}"))
            })?;

        Ok(acquired.map(|_| ReconcileLease {
            key: key.to_owned(),
            holder_id: holder_id.to_owned(),
            token,
        }))
    }

    async fn release(&self, lease: &ReconcileLease) -> AppResult<()> {
        let mut connection = self.connection().await?;

        Script::new(RELEASE_LEASE_SCRIPT)
            .key(self.key_for(lease.key.as_str()))
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Transient(format!("failed to release reconcile lease: {error}"))
            })?;

        Ok(())
    }
}
