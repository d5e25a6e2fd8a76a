use chrono::{DateTime, TimeDelta, Utc};
use jit_core::{AppError, AppResult};
use jit_domain::{AccessJob, AccessRequest, CleanupPolicy, JobPhase, RequestPhase, SessionName};
use tracing::{info, warn};

use crate::access_ports::ReconcileKey;
use crate::reconcile_context::ReconcileContext;

use super::{ReconcileAction, Reconciler};

/// Seconds a start time may be pushed forward to find a free session name.
const SESSION_NAME_SEARCH_SECONDS: i64 = 60;

impl Reconciler {
    pub(super) async fn reconcile_job(
        &self,
        id: &str,
        context: &ReconcileContext,
    ) -> AppResult<ReconcileAction> {
        let Some(job) = self.jobs.find(id).await? else {
            return Ok(ReconcileAction::await_change());
        };

        let Some(parent) = self.requests.find(job.request_ref()).await? else {
            return self.reconcile_orphaned_job(job, context).await;
        };

        match job.phase() {
            JobPhase::Pending => self.start_job(job, &parent).await,
            JobPhase::Creating => self.grant_job(job, &parent, context).await,
            JobPhase::Active => self.watch_job(job, &parent, context).await,
            JobPhase::Expiring => self.finish_job(job, context).await,
            JobPhase::Completed => self.retire_job(&job).await,
            JobPhase::Failed => Ok(ReconcileAction::await_change()),
        }
    }

    async fn reconcile_orphaned_job(
        &self,
        mut job: AccessJob,
        context: &ReconcileContext,
    ) -> AppResult<ReconcileAction> {
        match job.phase() {
            JobPhase::Pending | JobPhase::Creating | JobPhase::Active => {
                job.begin_expiring("ParentDeleted", self.clock.now())?;
                let job = self.jobs.update(job).await?;
                info!(job_id = %job.id(), "parent request deleted; revoking access");
                Ok(self.immediately())
            }
            JobPhase::Expiring => {
                let job_id = job.id().to_owned();
                let cleanup_policy = job.cleanup_policy();
                self.finish_job(job, context).await?;
                if cleanup_policy != CleanupPolicy::Manual {
                    self.jobs.delete(job_id.as_str()).await?;
                }
                Ok(ReconcileAction::await_change())
            }
            JobPhase::Completed | JobPhase::Failed => {
                if job.cleanup_policy() != CleanupPolicy::Manual {
                    self.jobs.delete(job.id()).await?;
                    info!(job_id = %job.id(), "job record deleted with its request");
                }
                Ok(ReconcileAction::await_change())
            }
        }
    }

    async fn start_job(
        &self,
        mut job: AccessJob,
        parent: &AccessRequest,
    ) -> AppResult<ReconcileAction> {
        let now = self.clock.now();
        if matches!(parent.phase(), RequestPhase::Approved | RequestPhase::Active) {
            let started_at = self.free_session_start(&job, now).await?;
            job.begin_creating(started_at)?;
        } else {
            job.begin_expiring("RequestEnded", now)?;
        }

        let job = self.jobs.update(job).await?;
        info!(job_id = %job.id(), phase = %job.phase(), "job started");
        Ok(self.immediately())
    }

    async fn grant_job(
        &self,
        mut job: AccessJob,
        parent: &AccessRequest,
        context: &ReconcileContext,
    ) -> AppResult<ReconcileAction> {
        let now = self.clock.now();
        if parent_ended(parent) {
            job.begin_expiring("RequestEnded", now)?;
            self.jobs.update(job).await?;
            return Ok(self.immediately());
        }
        if job.is_expired_at(now) {
            job.begin_expiring("WindowElapsed", now)?;
            let job = self.jobs.update(job).await?;
            warn!(job_id = %job.id(), "access window elapsed before the grant was issued");
            return Ok(self.immediately());
        }

        match self.executor.grant(&job, context).await {
            Ok(grant) => {
                let session_expires_at = grant.session_expires_at;
                job.activate(grant, self.clock.now())?;
                let job = self.jobs.update(job).await?;
                let now = self.clock.now();

                Ok(self
                    .requeue_at(self.next_check(&job, session_expires_at), now)
                    .with_follow_up(ReconcileKey::Request(job.request_ref().to_owned())))
            }
            Err(error) if error.is_retryable() => Err(error),
            Err(error) => {
                warn!(job_id = %job.id(), error = %error, "grant failed");
                job.fail("GrantFailed", error.to_string().as_str(), self.clock.now())?;
                let job = self.jobs.update(job).await?;

                Ok(ReconcileAction::await_change()
                    .with_follow_up(ReconcileKey::Request(job.request_ref().to_owned())))
            }
        }
    }

    async fn watch_job(
        &self,
        mut job: AccessJob,
        parent: &AccessRequest,
        context: &ReconcileContext,
    ) -> AppResult<ReconcileAction> {
        let now = self.clock.now();
        let reason = if parent_ended(parent) {
            Some(match parent.phase() {
                RequestPhase::Revoked => "Revoked",
                _ => "RequestEnded",
            })
        } else if job.is_expired_at(now) {
            Some("WindowElapsed")
        } else {
            None
        };

        if let Some(reason) = reason {
            job.begin_expiring(reason, now)?;
            let job = self.jobs.update(job).await?;
            info!(job_id = %job.id(), reason, "revoking access");
            return Ok(self
                .immediately()
                .with_follow_up(ReconcileKey::Request(job.request_ref().to_owned())));
        }

        let Some(mut session_expires_at) = job
            .access_entry()
            .map(|entry| entry.session_expires_at)
        else {
            return Ok(ReconcileAction::await_change());
        };

        let expiry_time = job.expiry_time().unwrap_or(now);
        if session_expires_at < expiry_time
            && session_expires_at - self.settings.refresh_window <= now
        {
            session_expires_at = self.executor.refresh(&job, context).await?;
            job.refresh_session(session_expires_at, self.clock.now())?;
            job = self.jobs.update(job).await?;
        }

        Ok(self.requeue_at(self.next_check(&job, session_expires_at), self.clock.now()))
    }

    /// Returns the first second at or after `now` whose session name no other
    /// job holds. Jobs sharing a name would share one cluster principal.
    async fn free_session_start(
        &self,
        job: &AccessJob,
        now: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        for offset in 0..SESSION_NAME_SEARCH_SECONDS {
            let started_at = now + TimeDelta::seconds(offset);
            let name = SessionName::build(job.requester_id(), &job.target().name, started_at);
            match self.jobs.find_by_session_name(name.as_str()).await? {
                Some(holder) if holder.id() != job.id() => continue,
                _ => return Ok(started_at),
            }
        }

        Err(AppError::Transient(format!(
            "no free session name for job '{}' within {SESSION_NAME_SEARCH_SECONDS}s",
            job.id()
        )))
    }

    async fn finish_job(
        &self,
        mut job: AccessJob,
        context: &ReconcileContext,
    ) -> AppResult<ReconcileAction> {
        self.executor.revoke(&job, context).await?;
        job.complete(self.clock.now())?;
        let job = self.jobs.update(job).await?;
        info!(job_id = %job.id(), "job completed");

        if job.cleanup_policy() == CleanupPolicy::OnExpiry {
            self.jobs.delete(job.id()).await?;
        }

        Ok(ReconcileAction::await_change()
            .with_follow_up(ReconcileKey::Request(job.request_ref().to_owned())))
    }

    async fn retire_job(&self, job: &AccessJob) -> AppResult<ReconcileAction> {
        if job.cleanup_policy() == CleanupPolicy::OnExpiry {
            self.jobs.delete(job.id()).await?;
        }
        Ok(ReconcileAction::await_change())
    }

    fn next_check(&self, job: &AccessJob, session_expires_at: DateTime<Utc>) -> DateTime<Utc> {
        let refresh_at = session_expires_at - self.settings.refresh_window;
        match job.expiry_time() {
            Some(expiry_time) if session_expires_at < expiry_time => expiry_time.min(refresh_at),
            Some(expiry_time) => expiry_time,
            None => refresh_at,
        }
    }
}

fn parent_ended(parent: &AccessRequest) -> bool {
    matches!(
        parent.phase(),
        RequestPhase::Revoked | RequestPhase::Expired | RequestPhase::Denied
    )
}
