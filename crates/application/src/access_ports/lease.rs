use async_trait::async_trait;
use jit_core::AppResult;

/// Held lease serializing reconciles of one key across replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileLease {
    /// Leased key.
    pub key: String,
    /// Holder identifier.
    pub holder_id: String,
    /// Random ownership token.
    pub token: String,
}

/// Distributed coordination port for per-key reconcile leases.
#[async_trait]
pub trait ReconcileLeaseCoordinator: Send + Sync {
    /// Attempts to acquire the lease for one key.
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcileLease>>;

    /// Releases a lease using token compare-and-delete semantics.
    async fn release(&self, lease: &ReconcileLease) -> AppResult<()>;
}
