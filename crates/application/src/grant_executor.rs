//! Composite grant and revoke over session minting, cluster binding and
//! kubeconfig rendering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jit_core::{AppError, AppResult};
use jit_domain::{
    AccessDuration, AccessJob, ClusterTarget, IssuedGrant, SessionName, policy_bindings,
};
use serde_json::json;
use tracing::{info, warn};

use crate::access_ports::{
    AccessBinding, Clock, ClusterAccessBinder, MintSessionInput, SecretStore, SessionCredentials,
    SessionMinter,
};
use crate::kubeconfig::render_kubeconfig;
use crate::reconcile_context::ReconcileContext;

/// Returns the secret key holding a job's session credentials.
#[must_use]
pub fn credentials_secret_key(job_id: &str) -> String {
    format!("jit-{job_id}-credentials")
}

/// Returns the secret key holding a job's kubeconfig.
#[must_use]
pub fn kubeconfig_secret_key(job_id: &str) -> String {
    format!("jit-{job_id}-kubeconfig")
}

/// Derives the session principal ARN.
#[must_use]
pub fn principal_arn(target: &ClusterTarget, role_name: &str, session_name: &SessionName) -> String {
    format!(
        "arn:aws:sts::{}:assumed-role/{role_name}/{}",
        target.account.as_str(),
        session_name.as_str()
    )
}

/// Returns the Kubernetes username attached to the access entry.
#[must_use]
pub fn access_username(job: &AccessJob) -> String {
    format!("jit:{}", job.requester_id().as_str())
}

/// Returns the least-privilege inline session policy for one cluster.
#[must_use]
pub fn inline_session_policy(target: &ClusterTarget) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["eks:DescribeCluster", "eks:AccessKubernetesApi"],
                "Resource": target.arn(),
            }
        ]
    })
    .to_string()
}

/// Computes the session lifetime: the remaining window capped by the
/// operator bound and the provider ceiling, floored at the provider minimum.
///
/// Inside the last [`AccessDuration::MIN`] of a window the floor lets the
/// credentials outlive `expiry_time` by less than that minimum. Cluster access
/// still ends at `expiry_time`, when the binding is removed.
#[must_use]
pub fn session_ttl(
    now: DateTime<Utc>,
    expiry_time: DateTime<Utc>,
    max_duration: AccessDuration,
) -> AccessDuration {
    let remaining = u64::try_from((expiry_time - now).num_seconds()).unwrap_or(0);
    AccessDuration::from_seconds(remaining)
        .min(max_duration)
        .min(AccessDuration::SESSION_CEILING)
        .max(AccessDuration::MIN)
}

/// Grant executor composing the minter, binder, renderer and secret store.
#[derive(Clone)]
pub struct GrantExecutor {
    minter: Arc<dyn SessionMinter>,
    binder: Arc<dyn ClusterAccessBinder>,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    max_duration: AccessDuration,
}

impl GrantExecutor {
    /// Creates a grant executor.
    #[must_use]
    pub fn new(
        minter: Arc<dyn SessionMinter>,
        binder: Arc<dyn ClusterAccessBinder>,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        max_duration: AccessDuration,
    ) -> Self {
        Self {
            minter,
            binder,
            secrets,
            clock,
            max_duration,
        }
    }

    /// Returns the cluster access binder.
    #[must_use]
    pub fn binder(&self) -> &Arc<dyn ClusterAccessBinder> {
        &self.binder
    }

    /// Mints a session, binds it on the cluster and stores credentials and
    /// kubeconfig.
    ///
    /// A failure after the binding exists unbinds it before reporting. The
    /// error is `Transient` when that compensation succeeded, and
    /// `ExternalFailure` when it did not.
    ///
    /// A job whose window has already elapsed is refused with `Conflict`.
    pub async fn grant(&self, job: &AccessJob, context: &ReconcileContext) -> AppResult<IssuedGrant> {
        let (session_name, expiry_time) = live_window(job, self.clock.now())?;
        let target = job.target();

        let credentials = self.mint(job, session_name, expiry_time, context).await?;
        let principal = principal_arn(target, job.role_name(), session_name);

        let binding = AccessBinding {
            cluster: target.clone(),
            principal: principal.clone(),
            username: access_username(job),
            policies: policy_bindings(job.permissions(), job.namespaces()),
        };
        context
            .call("bind access entry", self.binder.bind(&binding))
            .await?;

        match self
            .store_secrets(job, session_name, &credentials, context)
            .await
        {
            Ok(()) => {
                info!(
                    job_id = %job.id(),
                    cluster = %target.name,
                    session_name = %session_name,
                    session_expires_at = %credentials.expires_at,
                    "access granted"
                );
                Ok(IssuedGrant {
                    principal,
                    credentials_ref: credentials_secret_key(job.id()),
                    kubeconfig_ref: kubeconfig_secret_key(job.id()),
                    session_expires_at: credentials.expires_at,
                })
            }
            Err(error) => Err(self.compensate(job, &principal, error, context).await),
        }
    }

    /// Re-mints the session of an active job and rewrites both secrets.
    ///
    /// The session name and binding stay the same. Refused with `Conflict`
    /// once the window has elapsed.
    pub async fn refresh(
        &self,
        job: &AccessJob,
        context: &ReconcileContext,
    ) -> AppResult<DateTime<Utc>> {
        let (session_name, expiry_time) = live_window(job, self.clock.now())?;
        let credentials = self.mint(job, session_name, expiry_time, context).await?;
        self.store_secrets(job, session_name, &credentials, context)
            .await?;

        info!(
            job_id = %job.id(),
            session_expires_at = %credentials.expires_at,
            "session refreshed"
        );
        Ok(credentials.expires_at)
    }

    /// Unbinds the access entry and deletes both secrets. Safe to repeat.
    pub async fn revoke(&self, job: &AccessJob, context: &ReconcileContext) -> AppResult<()> {
        if let Some(session_name) = job.session_name() {
            let principal = principal_arn(job.target(), job.role_name(), session_name);
            match context
                .call(
                    "unbind access entry",
                    self.binder.unbind(job.target(), principal.as_str()),
                )
                .await
            {
                Ok(()) | Err(AppError::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }

        for key in [
            credentials_secret_key(job.id()),
            kubeconfig_secret_key(job.id()),
        ] {
            context
                .call("delete secret", self.secrets.delete(key.as_str()))
                .await?;
        }

        info!(job_id = %job.id(), cluster = %job.target().name, "access revoked");
        Ok(())
    }

    async fn mint(
        &self,
        job: &AccessJob,
        session_name: &SessionName,
        expiry_time: DateTime<Utc>,
        context: &ReconcileContext,
    ) -> AppResult<SessionCredentials> {
        let ttl = session_ttl(self.clock.now(), expiry_time, self.max_duration);
        let input = MintSessionInput {
            role_identity: job.role_identity().to_owned(),
            session_name: session_name.clone(),
            ttl,
            inline_policy: inline_session_policy(job.target()),
            tags: vec![
                ("Purpose".to_owned(), "JITAccess".to_owned()),
                ("UserID".to_owned(), job.requester_id().as_str().to_owned()),
                ("ClusterID".to_owned(), job.target().name.as_str().to_owned()),
                ("RequestID".to_owned(), job.request_ref().to_owned()),
            ],
        };

        context.call("mint session", self.minter.mint(input)).await
    }

    async fn store_secrets(
        &self,
        job: &AccessJob,
        session_name: &SessionName,
        credentials: &SessionCredentials,
        context: &ReconcileContext,
    ) -> AppResult<()> {
        let target = job.target();
        let description = context
            .call("describe cluster", self.binder.describe_cluster(target))
            .await?;
        let kubeconfig = render_kubeconfig(&description, credentials, &target.region, session_name)?;
        let credentials_document = serde_json::to_vec(credentials).map_err(|error| {
            AppError::Internal(format!("failed to encode session credentials: {error}"))
        })?;

        context
            .call(
                "write credentials secret",
                self.secrets
                    .put(credentials_secret_key(job.id()).as_str(), &credentials_document),
            )
            .await?;
        context
            .call(
                "write kubeconfig secret",
                self.secrets
                    .put(kubeconfig_secret_key(job.id()).as_str(), kubeconfig.as_bytes()),
            )
            .await
    }

    async fn compensate(
        &self,
        job: &AccessJob,
        principal: &str,
        cause: AppError,
        context: &ReconcileContext,
    ) -> AppError {
        warn!(job_id = %job.id(), error = %cause, "grant failed after binding; unbinding");

        let unbind = context
            .call(
                "unbind access entry",
                self.binder.unbind(job.target(), principal),
            )
            .await;

        match unbind {
            Ok(()) | Err(AppError::NotFound(_)) => {
                for key in [
                    credentials_secret_key(job.id()),
                    kubeconfig_secret_key(job.id()),
                ] {
                    if let Err(error) = context
                        .call("delete secret", self.secrets.delete(key.as_str()))
                        .await
                    {
                        warn!(
                            job_id = %job.id(),
                            key = %key,
                            error = %error,
                            "failed to delete secret after rollback"
                        );
                    }
                }
                AppError::Transient(format!("grant rolled back: {cause}"))
            }
            Err(unbind_error) => AppError::ExternalFailure(format!(
                "grant failed ({cause}) and unbinding failed ({unbind_error})"
            )),
        }
    }
}

fn live_window(
    job: &AccessJob,
    now: DateTime<Utc>,
) -> AppResult<(&SessionName, DateTime<Utc>)> {
    match (job.session_name(), job.expiry_time()) {
        (Some(_), Some(expiry_time)) if now >= expiry_time => Err(AppError::Conflict(format!(
            "access window of job '{}' ended at {}",
            job.id(),
            expiry_time.to_rfc3339()
        ))),
        (Some(session_name), Some(expiry_time)) => Ok((session_name, expiry_time)),
        _ => Err(AppError::Internal(format!(
            "job '{}' has no fixed window",
            job.id()
        ))),
    }
}
