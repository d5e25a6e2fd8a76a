use std::collections::HashMap;

use async_trait::async_trait;
use jit_application::ClusterRepository;
use jit_core::{AppError, AppResult};
use jit_domain::{Cluster, ClusterName};
use tokio::sync::RwLock;

/// In-memory cluster registry guarded by a readers-writer lock.
#[derive(Debug, Default)]
pub struct InMemoryClusterRepository {
    clusters: RwLock<HashMap<String, Cluster>>,
}

impl InMemoryClusterRepository {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterRepository for InMemoryClusterRepository {
    async fn save(&self, cluster: Cluster) -> AppResult<()> {
        let mut clusters = self.clusters.write().await;
        if clusters
            .values()
            .any(|stored| stored.name() == cluster.name() && stored.id() != cluster.id())
        {
            return Err(AppError::Conflict(format!(
                "cluster '{}' already exists",
                cluster.name()
            )));
        }

        clusters.insert(cluster.id().to_owned(), cluster);
        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<Cluster>> {
        Ok(self.clusters.read().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &ClusterName) -> AppResult<Option<Cluster>> {
        Ok(self
            .clusters
            .read()
            .await
            .values()
            .find(|cluster| cluster.name() == name)
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<Cluster>> {
        let mut clusters = self
            .clusters
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        clusters.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(clusters)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.clusters.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use jit_domain::{ClusterInput, Environment};

    use super::*;
    use crate::test_fixtures::cluster;

    #[tokio::test]
    async fn names_stay_unique_across_ids() {
        let repository = InMemoryClusterRepository::new();
        assert!(repository.save(cluster("prod-east-1")).await.is_ok());
        assert!(repository.save(cluster("dev-east-1")).await.is_ok());
        assert!(repository.save(cluster("dev-east-1")).await.is_ok());

        let clash = Cluster::new(
            "other-id",
            ClusterInput {
                name: "dev-east-1".to_owned(),
                display_name: None,
                account: "123456789012".to_owned(),
                region: "us-east-1".to_owned(),
                environment: Environment::Staging,
                max_duration: None,
                required_approvers_count: 0,
                enabled: true,
            },
        )
        .unwrap_or_else(|_| unreachable!());
        let result = repository.save(clash).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let names = repository
            .list()
            .await
            .unwrap_or_default()
            .iter()
            .map(|cluster| cluster.name().as_str().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["dev-east-1", "prod-east-1"]);
    }
}
