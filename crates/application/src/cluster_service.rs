use std::sync::Arc;

use jit_core::{AppError, AppResult, CallerIdentity};
use jit_domain::{Cluster, ClusterInput, ClusterName, OperatorPermission, RequestPhase};
use tracing::info;
use uuid::Uuid;

use crate::access_ports::{
    AccessRequestQuery, AccessRequestRepository, ClusterRepository, ReconcileKey,
    ReconcileTrigger,
};
use crate::authorization_service::AuthorizationService;

/// Application service for the cluster registry.
#[derive(Clone)]
pub struct ClusterService {
    clusters: Arc<dyn ClusterRepository>,
    requests: Arc<dyn AccessRequestRepository>,
    trigger: Arc<dyn ReconcileTrigger>,
    authorization: AuthorizationService,
}

impl ClusterService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        clusters: Arc<dyn ClusterRepository>,
        requests: Arc<dyn AccessRequestRepository>,
        trigger: Arc<dyn ReconcileTrigger>,
        authorization: AuthorizationService,
    ) -> Self {
        Self {
            clusters,
            requests,
            trigger,
            authorization,
        }
    }

    /// Registers a cluster. Requires `manage-clusters`.
    pub async fn create(&self, actor: &CallerIdentity, input: ClusterInput) -> AppResult<Cluster> {
        self.authorization
            .require_permission(actor, OperatorPermission::ManageClusters)
            .await?;

        let cluster = Cluster::new(Uuid::new_v4().to_string(), input)?;
        if self.clusters.find_by_name(cluster.name()).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "cluster '{}' already exists",
                cluster.name()
            )));
        }
        self.clusters.save(cluster.clone()).await?;

        info!(
            cluster_id = %cluster.id(),
            cluster = %cluster.name(),
            environment = cluster.environment().as_str(),
            actor = %actor.subject(),
            "cluster registered"
        );
        Ok(cluster)
    }

    /// Replaces a registered cluster. Requires `manage-clusters`.
    pub async fn update(
        &self,
        actor: &CallerIdentity,
        id: &str,
        input: ClusterInput,
    ) -> AppResult<Cluster> {
        self.authorization
            .require_permission(actor, OperatorPermission::ManageClusters)
            .await?;

        let current = self.load(id).await?;
        let cluster = Cluster::new(current.id(), input)?;
        self.clusters.save(cluster.clone()).await?;

        info!(
            cluster_id = %cluster.id(),
            cluster = %cluster.name(),
            actor = %actor.subject(),
            "cluster updated"
        );
        if !cluster.enabled() || cluster.name() != current.name() {
            self.requeue_open_requests(current.name()).await?;
        }
        Ok(cluster)
    }

    /// Removes a cluster. Requires `manage-clusters`.
    pub async fn delete(&self, actor: &CallerIdentity, id: &str) -> AppResult<()> {
        self.authorization
            .require_permission(actor, OperatorPermission::ManageClusters)
            .await?;

        let current = self.load(id).await?;
        if !self.clusters.delete(current.id()).await? {
            return Err(AppError::NotFound(format!("cluster '{id}'")));
        }

        info!(
            cluster_id = %current.id(),
            cluster = %current.name(),
            actor = %actor.subject(),
            "cluster removed"
        );
        self.requeue_open_requests(current.name()).await
    }

    /// Returns one cluster by registry id or name.
    pub async fn get(&self, actor: &CallerIdentity, id_or_name: &str) -> AppResult<Cluster> {
        self.authorization.role_of(actor).await?;

        if let Some(cluster) = self.clusters.find(id_or_name).await? {
            return Ok(cluster);
        }
        let name = ClusterName::new(id_or_name)
            .map_err(|_| AppError::NotFound(format!("cluster '{id_or_name}'")))?;
        self.clusters
            .find_by_name(&name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster '{id_or_name}'")))
    }

    /// Lists registered clusters ordered by name.
    pub async fn list(&self, actor: &CallerIdentity) -> AppResult<Vec<Cluster>> {
        self.authorization.role_of(actor).await?;

        let mut clusters = self.clusters.list().await?;
        clusters.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(clusters)
    }

    /// Lists clusters currently accepting requests.
    pub async fn list_enabled(&self, actor: &CallerIdentity) -> AppResult<Vec<Cluster>> {
        Ok(self
            .list(actor)
            .await?
            .into_iter()
            .filter(Cluster::enabled)
            .collect())
    }

    async fn load(&self, id: &str) -> AppResult<Cluster> {
        self.clusters
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster '{id}'")))
    }

    // Pending and approved requests react to a vanished or disabled cluster.
    async fn requeue_open_requests(&self, name: &ClusterName) -> AppResult<()> {
        let query = AccessRequestQuery {
            cluster: Some(name.clone()),
            phases: Some(vec![RequestPhase::Pending, RequestPhase::Approved]),
            ..AccessRequestQuery::default()
        };
        for request in self.requests.list(&query).await? {
            self.trigger
                .enqueue(ReconcileKey::Request(request.id().to_owned()))
                .await;
        }
        Ok(())
    }
}
