//! Out-of-band drift correction over cluster access entries.

use std::sync::Arc;
use std::time::Duration;

use jit_core::{AppError, AppResult};
use jit_domain::{AccessJob, Cluster, JobPhase, RequestPhase, SessionName};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access_ports::{
    AccessJobRepository, AccessRequestQuery, AccessRequestRepository, Clock, ClusterAccessBinder,
    ClusterRepository, ReconcileKey, ReconcileTrigger,
};
use crate::reconcile_context::ReconcileContext;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Managed entries inspected.
    pub scanned: usize,
    /// Entries unbound because nothing live owns them.
    pub orphans_removed: usize,
    /// Live grants found past their window and handed to the reconciler.
    pub expired: usize,
}

impl SweepReport {
    fn absorb(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.orphans_removed += other.orphans_removed;
        self.expired += other.expired;
    }
}

/// Scans cluster access entries and removes what no live job owns.
#[derive(Clone)]
pub struct ExpirySweeper {
    requests: Arc<dyn AccessRequestRepository>,
    jobs: Arc<dyn AccessJobRepository>,
    clusters: Arc<dyn ClusterRepository>,
    binder: Arc<dyn ClusterAccessBinder>,
    trigger: Arc<dyn ReconcileTrigger>,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    /// Creates a sweeper.
    #[must_use]
    pub fn new(
        requests: Arc<dyn AccessRequestRepository>,
        jobs: Arc<dyn AccessJobRepository>,
        clusters: Arc<dyn ClusterRepository>,
        binder: Arc<dyn ClusterAccessBinder>,
        trigger: Arc<dyn ReconcileTrigger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            jobs,
            clusters,
            binder,
            trigger,
            clock,
        }
    }

    /// Sweeps on a fixed interval until `shutdown` fires.
    ///
    /// Each pass gets its own context bounded by `interval`.
    pub async fn run(
        &self,
        interval: Duration,
        call_timeout: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "expiry sweeper started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let context = ReconcileContext::new(
                        interval,
                        call_timeout,
                        shutdown.child_token(),
                    );
                    if let Err(error) = self.sweep_all(&context).await {
                        warn!(error = %error, "expiry sweep failed");
                    }
                }
            }
        }
        info!("expiry sweeper stopped");
    }

    /// Sweeps every enabled cluster. A failing cluster is logged and skipped.
    pub async fn sweep_all(&self, context: &ReconcileContext) -> AppResult<SweepReport> {
        let mut report = SweepReport::default();
        for cluster in self.clusters.list().await? {
            if !cluster.enabled() {
                continue;
            }
            if context.is_done() {
                break;
            }

            match self.sweep_cluster(&cluster, context).await {
                Ok(cluster_report) => report.absorb(cluster_report),
                Err(error) => {
                    warn!(cluster = %cluster.name(), error = %error, "cluster sweep failed");
                }
            }
        }

        if report.orphans_removed > 0 || report.expired > 0 {
            info!(
                scanned = report.scanned,
                orphans_removed = report.orphans_removed,
                expired = report.expired,
                "sweep corrected drift"
            );
        }
        Ok(report)
    }

    /// Sweeps the managed access entries of one cluster.
    pub async fn sweep_cluster(
        &self,
        cluster: &Cluster,
        context: &ReconcileContext,
    ) -> AppResult<SweepReport> {
        let target = cluster.target();
        let principals = context
            .call(
                "list access entries",
                self.binder.list_access_entries(&target),
            )
            .await?;

        let mut report = SweepReport::default();
        for principal in principals {
            let Some(session_name) = managed_session_name(principal.as_str()) else {
                continue;
            };
            report.scanned += 1;

            let outcome = match self.jobs.find_by_session_name(session_name).await? {
                None => self
                    .remove_orphan(cluster, principal.as_str(), session_name, context)
                    .await
                    .map(|()| Swept::OrphanRemoved),
                Some(job) if job.phase().is_terminal() => self
                    .unbind(cluster, principal.as_str(), context)
                    .await
                    .map(|()| Swept::OrphanRemoved),
                Some(job) if job.is_expired_at(self.clock.now()) => {
                    self.expire_job(job).await.map(|()| Swept::Expired)
                }
                Some(_) => Ok(Swept::Untouched),
            };

            match outcome {
                Ok(Swept::OrphanRemoved) => report.orphans_removed += 1,
                Ok(Swept::Expired) => report.expired += 1,
                Ok(Swept::Untouched) => {}
                Err(AppError::Conflict(message)) => {
                    debug!(session_name, detail = %message, "entry changed during sweep");
                }
                Err(error) => return Err(error),
            }
        }

        Ok(report)
    }

    async fn remove_orphan(
        &self,
        cluster: &Cluster,
        principal: &str,
        session_name: &str,
        context: &ReconcileContext,
    ) -> AppResult<()> {
        self.unbind(cluster, principal, context).await?;
        info!(cluster = %cluster.name(), session_name, "orphaned access entry removed");

        let query = AccessRequestQuery {
            cluster: Some(cluster.name().clone()),
            phases: Some(vec![RequestPhase::Active]),
            ..AccessRequestQuery::default()
        };
        for mut request in self.requests.list(&query).await? {
            let references_session = request
                .access_entry()
                .is_some_and(|entry| entry.session_name.as_str() == session_name);
            if !references_session {
                continue;
            }

            request.expire("OrphanCleanup", self.clock.now())?;
            let request = self.requests.update(request).await?;
            info!(request_id = %request.id(), "request expired after orphan cleanup");
        }

        Ok(())
    }

    async fn unbind(
        &self,
        cluster: &Cluster,
        principal: &str,
        context: &ReconcileContext,
    ) -> AppResult<()> {
        match context
            .call(
                "unbind access entry",
                self.binder.unbind(&cluster.target(), principal),
            )
            .await
        {
            Ok(()) | Err(AppError::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn expire_job(&self, mut job: AccessJob) -> AppResult<()> {
        let now = self.clock.now();
        if let Some(mut request) = self.requests.find(job.request_ref()).await?
            && request.phase() == RequestPhase::Active
        {
            request.expire("WindowElapsed", now)?;
            self.requests.update(request).await?;
        }

        if job.phase() != JobPhase::Expiring {
            job.begin_expiring("WindowElapsed", now)?;
            job = self.jobs.update(job).await?;
        }
        info!(job_id = %job.id(), "sweeper expired a lapsed grant");

        self.trigger
            .enqueue(ReconcileKey::Job(job.id().to_owned()))
            .await;
        self.trigger
            .enqueue(ReconcileKey::Request(job.request_ref().to_owned()))
            .await;
        Ok(())
    }
}

enum Swept {
    OrphanRemoved,
    Expired,
    Untouched,
}

fn managed_session_name(principal: &str) -> Option<&str> {
    let session_name = principal.rsplit('/').next()?;
    SessionName::is_managed(session_name).then_some(session_name)
}
