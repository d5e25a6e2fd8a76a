use jit_core::AppResult;
use jit_domain::{
    AccessJob, AccessRequest, Cluster, Condition, JobPhase, RequestAccessEntry, RequestPhase,
};
use tracing::info;
use uuid::Uuid;

use crate::access_ports::ReconcileKey;
use crate::request_policy::is_auto_approvable;

use super::{ReconcileAction, Reconciler};

const GRANT_FAILED: &str = "GrantFailed";

impl Reconciler {
    pub(super) async fn reconcile_request(&self, id: &str) -> AppResult<ReconcileAction> {
        let Some(request) = self.requests.find(id).await? else {
            return Ok(ReconcileAction::await_change());
        };

        match request.phase() {
            RequestPhase::Pending => self.reconcile_pending(request).await,
            RequestPhase::Approved => self.reconcile_approved(request).await,
            RequestPhase::Active => self.reconcile_active(request).await,
            RequestPhase::Expired | RequestPhase::Revoked => self.reconcile_ended(&request).await,
            RequestPhase::Denied => Ok(ReconcileAction::await_change()),
        }
    }

    async fn available_cluster(&self, request: &AccessRequest) -> AppResult<Option<Cluster>> {
        Ok(self
            .clusters
            .find_by_name(&request.target().name)
            .await?
            .filter(Cluster::enabled))
    }

    async fn reconcile_pending(&self, mut request: AccessRequest) -> AppResult<ReconcileAction> {
        let now = self.clock.now();
        let Some(cluster) = self.available_cluster(&request).await? else {
            request.deny(
                "ClusterUnavailable",
                "target cluster was removed or disabled",
                now,
            )?;
            let request = self.requests.update(request).await?;
            info!(request_id = %request.id(), "request denied: cluster unavailable");
            self.notify(
                request.requester_id(),
                format!(
                    "Access request {} was denied: cluster {} is unavailable.",
                    request.id(),
                    request.target().name
                )
                .as_str(),
            )
            .await;
            return Ok(ReconcileAction::await_change());
        };

        let requester_role = self.roles.role_for(request.requester_id()).await?;
        let (reason, message) = if is_auto_approvable(
            cluster.environment(),
            request.permissions(),
            requester_role,
        ) {
            ("AutoApproved", "view-only access to a non-production cluster")
        } else {
            let teams = self.roles.teams().await?;
            let implicit_floor = usize::from(
                self.settings.approval_required && request.required_approvers().is_empty(),
            );
            let minimum = usize::try_from(cluster.required_approvers_count())
                .unwrap_or(usize::MAX)
                .max(implicit_floor);

            if !request.approvals_satisfied(minimum, |team, user| teams.is_member(team, user)) {
                return Ok(ReconcileAction::requeue(
                    self.settings.approval_poll_interval,
                ));
            }
            ("ApprovalsSatisfied", "all required approvals received")
        };

        request.approve(reason, message, now)?;
        let request = self.requests.update(request).await?;
        info!(request_id = %request.id(), reason, "request approved");

        Ok(self.immediately())
    }

    async fn reconcile_approved(&self, mut request: AccessRequest) -> AppResult<ReconcileAction> {
        let now = self.clock.now();
        let Some(job) = self.jobs.find_by_request(request.id()).await? else {
            if self.available_cluster(&request).await?.is_none() {
                if !request.has_condition(GRANT_FAILED) {
                    request.push_condition(Condition::new(
                        GRANT_FAILED,
                        now,
                        "ClusterUnavailable",
                        "target cluster was removed or disabled",
                    ));
                    self.requests.update(request).await?;
                }
                return Ok(ReconcileAction::await_change());
            }

            let job = AccessJob::for_request(
                Uuid::new_v4().to_string(),
                &request,
                self.settings.role_identity.as_str(),
                self.settings.cleanup_policy,
                now,
            );
            let job = self.jobs.create(job).await?;
            info!(request_id = %request.id(), job_id = %job.id(), "access job created");

            return Ok(self
                .immediately()
                .with_follow_up(ReconcileKey::Job(job.id().to_owned())));
        };

        match job.phase() {
            JobPhase::Active => {
                let (Some(session_name), Some(entry), Some(start_time), Some(expiry_time)) = (
                    job.session_name(),
                    job.access_entry(),
                    job.start_time(),
                    job.expiry_time(),
                ) else {
                    return Ok(self.immediately());
                };

                request.activate(
                    RequestAccessEntry {
                        principal: entry.principal.clone(),
                        session_name: session_name.clone(),
                        created_at: start_time,
                        expires_at: expiry_time,
                    },
                    now,
                )?;
                let request = self.requests.update(request).await?;
                info!(
                    request_id = %request.id(),
                    session_name = %session_name,
                    expires_at = %expiry_time,
                    "access active"
                );
                self.notify(
                    request.requester_id(),
                    format!(
                        "Access to {} is active until {}. Fetch your kubeconfig with request id {}.",
                        request.target().name,
                        expiry_time.to_rfc3339(),
                        request.id()
                    )
                    .as_str(),
                )
                .await;

                Ok(self.requeue_at(expiry_time, now))
            }
            JobPhase::Failed | JobPhase::Expiring | JobPhase::Completed => {
                if !request.has_condition(GRANT_FAILED) {
                    let message = job
                        .conditions()
                        .last()
                        .map_or_else(|| "grant did not complete".to_owned(), |condition| {
                            condition.message.clone()
                        });
                    request.push_condition(Condition::new(
                        GRANT_FAILED,
                        now,
                        job.phase().as_str(),
                        message,
                    ));
                    let request = self.requests.update(request).await?;
                    self.notify(
                        request.requester_id(),
                        format!("Access request {} could not be granted.", request.id()).as_str(),
                    )
                    .await;
                }
                Ok(ReconcileAction::await_change())
            }
            JobPhase::Pending | JobPhase::Creating => Ok(self.immediately()),
        }
    }

    async fn reconcile_active(&self, mut request: AccessRequest) -> AppResult<ReconcileAction> {
        let now = self.clock.now();
        let job = self.jobs.find_by_request(request.id()).await?;
        let expiry_time = request
            .access_entry()
            .map(|entry| entry.expires_at)
            .or_else(|| job.as_ref().and_then(AccessJob::expiry_time));

        let reason = match (&job, expiry_time) {
            (None, _) => "JobMissing",
            (Some(_), Some(expiry_time)) if now >= expiry_time => "WindowElapsed",
            (Some(job), _) if job.phase() == JobPhase::Completed => "JobCompleted",
            (Some(_), Some(expiry_time)) => return Ok(self.requeue_at(expiry_time, now)),
            (Some(_), None) => return Ok(self.immediately()),
        };

        request.expire(reason, now)?;
        let request = self.requests.update(request).await?;
        info!(request_id = %request.id(), reason, "access expired");
        self.notify(
            request.requester_id(),
            format!("Access to {} has expired.", request.target().name).as_str(),
        )
        .await;

        Ok(match job {
            Some(job) => ReconcileAction::await_change()
                .with_follow_up(ReconcileKey::Job(job.id().to_owned())),
            None => ReconcileAction::await_change(),
        })
    }

    async fn reconcile_ended(&self, request: &AccessRequest) -> AppResult<ReconcileAction> {
        let Some(job) = self.jobs.find_by_request(request.id()).await? else {
            return Ok(ReconcileAction::await_change());
        };

        if job.phase().is_terminal() {
            return Ok(ReconcileAction::await_change());
        }

        Ok(ReconcileAction::await_change().with_follow_up(ReconcileKey::Job(job.id().to_owned())))
    }
}
