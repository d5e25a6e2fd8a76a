use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_eks::Client;
use aws_sdk_eks::config::{Builder, Region};
use aws_sdk_eks::types::{AccessScope as EksAccessScope, AccessScopeType};
use jit_application::{AccessBinding, ClusterAccessBinder, ClusterDescription};
use jit_core::{AppError, AppResult};
use jit_domain::{AccessScope, ClusterTarget};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::aws_errors::map_sdk_error;

/// EKS access-entry binder; one client is kept per region.
pub struct AwsEksAccessBinder {
    base: SdkConfig,
    clients: RwLock<HashMap<String, Client>>,
}

impl AwsEksAccessBinder {
    /// Creates a binder from shared AWS configuration.
    #[must_use]
    pub fn new(base: SdkConfig) -> Self {
        Self {
            base,
            clients: RwLock::new(HashMap::new()),
        }
    }

    async fn client(&self, cluster: &ClusterTarget) -> Client {
        let region = cluster.region.as_str();
        if let Some(client) = self.clients.read().await.get(region) {
            return client.clone();
        }

        let config = Builder::from(&self.base)
            .region(Region::new(region.to_owned()))
            .build();
        let client = Client::from_conf(config);
        self.clients
            .write()
            .await
            .entry(region.to_owned())
            .or_insert(client)
            .clone()
    }
}

fn eks_scope(scope: &AccessScope) -> EksAccessScope {
    match scope {
        AccessScope::Cluster => EksAccessScope::builder()
            .r#type(AccessScopeType::Cluster)
            .build(),
        AccessScope::Namespace(namespaces) => EksAccessScope::builder()
            .r#type(AccessScopeType::Namespace)
            .set_namespaces(Some(
                namespaces
                    .iter()
                    .map(|namespace| namespace.as_str().to_owned())
                    .collect(),
            ))
            .build(),
    }
}

#[async_trait]
impl ClusterAccessBinder for AwsEksAccessBinder {
    async fn bind(&self, binding: &AccessBinding) -> AppResult<()> {
        let client = self.client(&binding.cluster).await;
        let cluster_name = binding.cluster.name.as_str();

        let created = client
            .create_access_entry()
            .cluster_name(cluster_name)
            .principal_arn(binding.principal.as_str())
            .username(binding.username.as_str())
            .r#type("STANDARD")
            .send()
            .await;
        match created.map_err(|error| map_sdk_error("create access entry", error)) {
            Ok(_) => info!(
                cluster = %cluster_name,
                principal = %binding.principal,
                "access entry created"
            ),
            Err(AppError::Conflict(_)) => debug!(
                cluster = %cluster_name,
                principal = %binding.principal,
                "access entry already present"
            ),
            Err(error) => return Err(error),
        }

        for (policy, scope) in &binding.policies {
            client
                .associate_access_policy()
                .cluster_name(cluster_name)
                .principal_arn(binding.principal.as_str())
                .policy_arn(policy.arn())
                .access_scope(eks_scope(scope))
                .send()
                .await
                .map_err(|error| map_sdk_error("associate access policy", error))?;
        }

        Ok(())
    }

    async fn unbind(&self, cluster: &ClusterTarget, principal: &str) -> AppResult<()> {
        self.client(cluster)
            .await
            .delete_access_entry()
            .cluster_name(cluster.name.as_str())
            .principal_arn(principal)
            .send()
            .await
            .map_err(|error| map_sdk_error("delete access entry", error))?;

        info!(cluster = %cluster.name.as_str(), principal = %principal, "access entry deleted");
        Ok(())
    }

    async fn list_access_entries(&self, cluster: &ClusterTarget) -> AppResult<Vec<String>> {
        let client = self.client(cluster).await;
        let mut principals = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = client
                .list_access_entries()
                .cluster_name(cluster.name.as_str())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|error| map_sdk_error("list access entries", error))?;

            principals.extend(output.access_entries().iter().cloned());
            next_token = output.next_token().map(str::to_owned);
            if next_token.is_none() {
                return Ok(principals);
            }
        }
    }

    async fn describe_cluster(&self, cluster: &ClusterTarget) -> AppResult<ClusterDescription> {
        let output = self
            .client(cluster)
            .await
            .describe_cluster()
            .name(cluster.name.as_str())
            .send()
            .await
            .map_err(|error| map_sdk_error("describe cluster", error))?;

        let described = output.cluster().ok_or_else(|| {
            AppError::NotFound(format!("cluster '{}'", cluster.name.as_str()))
        })?;
        let missing = |field: &str| {
            AppError::ExternalFailure(format!(
                "cluster '{}' has no {field} yet",
                cluster.name.as_str()
            ))
        };

        Ok(ClusterDescription {
            name: cluster.name.as_str().to_owned(),
            arn: described
                .arn()
                .map_or_else(|| cluster.arn(), str::to_owned),
            endpoint: described
                .endpoint()
                .ok_or_else(|| missing("endpoint"))?
                .to_owned(),
            certificate_authority: described
                .certificate_authority()
                .and_then(|authority| authority.data())
                .ok_or_else(|| missing("certificate authority"))?
                .to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use jit_domain::NamespaceName;

    use super::*;

    #[test]
    fn namespace_scope_lists_namespaces() {
        let namespaces = vec![
            NamespaceName::new("payments").unwrap_or_else(|_| unreachable!()),
            NamespaceName::new("default").unwrap_or_else(|_| unreachable!()),
        ];

        let scope = eks_scope(&AccessScope::Namespace(namespaces));
        assert_eq!(scope.r#type(), Some(&AccessScopeType::Namespace));
        assert_eq!(scope.namespaces(), ["payments", "default"]);

        let cluster = eks_scope(&AccessScope::Cluster);
        assert_eq!(cluster.r#type(), Some(&AccessScopeType::Cluster));
        assert!(cluster.namespaces().is_empty());
    }
}
