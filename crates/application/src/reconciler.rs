//! Request and job state machines.
//!
//! Each reconcile reads the current record, performs at most one transition
//! and returns a requeue hint. Writes go through compare-and-swap updates so a
//! stale reconcile fails with `Conflict` instead of overwriting newer state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jit_core::AppResult;
use jit_domain::{CleanupPolicy, UserId};
use tracing::warn;

use crate::access_ports::{
    AccessJobRepository, AccessRequestRepository, ChatGateway, Clock, ClusterRepository,
    ReconcileKey, RoleRegistry,
};
use crate::grant_executor::GrantExecutor;
use crate::reconcile_context::ReconcileContext;

mod job;
mod request;

/// Outcome of one reconcile run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileAction {
    requeue_after: Option<Duration>,
    follow_ups: Vec<ReconcileKey>,
}

impl ReconcileAction {
    /// Reconcile the same key again after `delay`.
    #[must_use]
    pub fn requeue(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
            follow_ups: Vec::new(),
        }
    }

    /// Nothing to do until the record changes.
    #[must_use]
    pub fn await_change() -> Self {
        Self::default()
    }

    /// Also reconcile `key` promptly.
    #[must_use]
    pub fn with_follow_up(mut self, key: ReconcileKey) -> Self {
        self.follow_ups.push(key);
        self
    }

    /// Returns the requeue delay, if any.
    #[must_use]
    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }

    /// Returns keys to reconcile promptly.
    #[must_use]
    pub fn follow_ups(&self) -> &[ReconcileKey] {
        &self.follow_ups
    }
}

/// Tunables of the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Durable role the session minter assumes.
    pub role_identity: String,
    /// Job record retention after completion.
    pub cleanup_policy: CleanupPolicy,
    /// Whether requests without named approvers still need one approval.
    pub approval_required: bool,
    /// Poll interval while waiting for approvals.
    pub approval_poll_interval: Duration,
    /// Longest sleep while access is live.
    pub active_recheck_interval: Duration,
    /// Floor used for "immediate" requeues.
    pub immediate_requeue: Duration,
    /// How long before session expiry the session is re-minted.
    pub refresh_window: TimeDelta,
}

impl ReconcilerSettings {
    /// Creates settings with default cadences.
    #[must_use]
    pub fn new(role_identity: impl Into<String>) -> Self {
        Self {
            role_identity: role_identity.into(),
            cleanup_policy: CleanupPolicy::OnDelete,
            approval_required: true,
            approval_poll_interval: Duration::from_secs(300),
            active_recheck_interval: Duration::from_secs(300),
            immediate_requeue: Duration::from_secs(2),
            refresh_window: TimeDelta::minutes(10),
        }
    }
}

/// Reconciler driving requests and their jobs.
#[derive(Clone)]
pub struct Reconciler {
    requests: Arc<dyn AccessRequestRepository>,
    jobs: Arc<dyn AccessJobRepository>,
    clusters: Arc<dyn ClusterRepository>,
    roles: Arc<dyn RoleRegistry>,
    executor: GrantExecutor,
    chat: Arc<dyn ChatGateway>,
    clock: Arc<dyn Clock>,
    settings: ReconcilerSettings,
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requests: Arc<dyn AccessRequestRepository>,
        jobs: Arc<dyn AccessJobRepository>,
        clusters: Arc<dyn ClusterRepository>,
        roles: Arc<dyn RoleRegistry>,
        executor: GrantExecutor,
        chat: Arc<dyn ChatGateway>,
        clock: Arc<dyn Clock>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            requests,
            jobs,
            clusters,
            roles,
            executor,
            chat,
            clock,
            settings,
        }
    }

    /// Reconciles one key.
    pub async fn reconcile(
        &self,
        key: &ReconcileKey,
        context: &ReconcileContext,
    ) -> AppResult<ReconcileAction> {
        match key {
            ReconcileKey::Request(id) => self.reconcile_request(id.as_str()).await,
            ReconcileKey::Job(id) => self.reconcile_job(id.as_str(), context).await,
        }
    }

    /// Lists every key that should be periodically resynced.
    pub async fn resync_keys(&self) -> AppResult<Vec<ReconcileKey>> {
        let mut keys = self
            .requests
            .list(&Default::default())
            .await?
            .into_iter()
            .filter(|request| !request.phase().is_terminal())
            .map(|request| ReconcileKey::Request(request.id().to_owned()))
            .collect::<Vec<_>>();

        keys.extend(
            self.jobs
                .list()
                .await?
                .into_iter()
                .filter(|job| {
                    !job.phase().is_terminal() || job.cleanup_policy() != CleanupPolicy::Manual
                })
                .map(|job| ReconcileKey::Job(job.id().to_owned())),
        );

        Ok(keys)
    }

    fn immediately(&self) -> ReconcileAction {
        ReconcileAction::requeue(self.settings.immediate_requeue)
    }

    fn requeue_at(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> ReconcileAction {
        let until = (at - now).to_std().unwrap_or(Duration::ZERO);
        ReconcileAction::requeue(
            until
                .min(self.settings.active_recheck_interval)
                .max(self.settings.immediate_requeue),
        )
    }

    async fn notify(&self, user_id: &UserId, message: &str) {
        if let Err(error) = self.chat.notify_user(user_id, message).await {
            warn!(user_id = %user_id, error = %error, "failed to deliver chat notification");
        }
    }
}
