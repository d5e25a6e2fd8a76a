use std::fmt::{Display, Formatter};

use async_trait::async_trait;

/// Work item identifying the record to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReconcileKey {
    /// An access request by id.
    Request(String),
    /// An access job by id.
    Job(String),
}

impl Display for ReconcileKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(id) => write!(formatter, "request/{id}"),
            Self::Job(id) => write!(formatter, "job/{id}"),
        }
    }
}

/// Schedules reconciliation of a key.
#[async_trait]
pub trait ReconcileTrigger: Send + Sync {
    /// Enqueues a key for prompt reconciliation.
    async fn enqueue(&self, key: ReconcileKey);
}

/// Trigger used when reconciliation runs in another process; periodic
/// resync picks the change up instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReconcileTrigger;

#[async_trait]
impl ReconcileTrigger for NoopReconcileTrigger {
    async fn enqueue(&self, _key: ReconcileKey) {}
}
