//! Local stand-in for the STS and EKS APIs used in development.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::TimeDelta;
use jit_application::{
    AccessBinding, Clock, ClusterAccessBinder, ClusterDescription, MintSessionInput,
    SessionCredentials, SessionMinter,
};
use jit_core::{AppError, AppResult};
use jit_domain::{AccessDuration, ClusterTarget};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

const SIMULATED_CA: &str = "-----BEGIN CERTIFICATE-----\nsimulated\n-----END CERTIFICATE-----\n";

/// In-process cloud that mints fake sessions and tracks access entries.
pub struct SimulatedCloud {
    clock: Arc<dyn Clock>,
    entries: RwLock<BTreeMap<(String, String), AccessBinding>>,
}

impl SimulatedCloud {
    /// Creates an empty simulated cloud.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the stored binding for one principal.
    pub async fn binding(&self, cluster: &ClusterTarget, principal: &str) -> Option<AccessBinding> {
        self.entries
            .read()
            .await
            .get(&(cluster.name.as_str().to_owned(), principal.to_owned()))
            .cloned()
    }
}

fn random_token(length: usize) -> String {
    let mut token = String::new();
    while token.len() < length {
        token.push_str(Uuid::new_v4().simple().to_string().as_str());
    }
    token.truncate(length);
    token.to_uppercase()
}

#[async_trait]
impl SessionMinter for SimulatedCloud {
    async fn mint(&self, input: MintSessionInput) -> AppResult<SessionCredentials> {
        if input.ttl > AccessDuration::SESSION_CEILING || input.ttl < AccessDuration::MIN {
            return Err(AppError::ExternalFailure(format!(
                "session duration {} is outside the provider bounds",
                input.ttl
            )));
        }
        if input.inline_policy.trim().is_empty() {
            return Err(AppError::ExternalFailure(
                "inline session policy must not be empty".to_owned(),
            ));
        }

        let seconds = i64::try_from(input.ttl.as_seconds())
            .map_err(|_| AppError::Validation(format!("ttl {} is out of range", input.ttl)))?;
        let expires_at = self.clock.now() + TimeDelta::seconds(seconds);
        info!(
            session_name = %input.session_name.as_str(),
            expires_at = %expires_at,
            "simulated session minted"
        );

        Ok(SessionCredentials {
            access_key_id: format!("ASIA{}", random_token(16)),
            secret_access_key: random_token(40),
            session_token: random_token(64),
            expires_at,
        })
    }
}

#[async_trait]
impl ClusterAccessBinder for SimulatedCloud {
    async fn bind(&self, binding: &AccessBinding) -> AppResult<()> {
        self.entries.write().await.insert(
            (
                binding.cluster.name.as_str().to_owned(),
                binding.principal.clone(),
            ),
            binding.clone(),
        );
        Ok(())
    }

    async fn unbind(&self, cluster: &ClusterTarget, principal: &str) -> AppResult<()> {
        self.entries
            .write()
            .await
            .remove(&(cluster.name.as_str().to_owned(), principal.to_owned()))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("access entry '{principal}'")))
    }

    async fn list_access_entries(&self, cluster: &ClusterTarget) -> AppResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|(name, _)| name == cluster.name.as_str())
            .map(|(_, principal)| principal.clone())
            .collect())
    }

    async fn describe_cluster(&self, cluster: &ClusterTarget) -> AppResult<ClusterDescription> {
        Ok(ClusterDescription {
            name: cluster.name.as_str().to_owned(),
            arn: cluster.arn(),
            endpoint: format!(
                "https://{}.{}.eks.local",
                cluster.name.as_str(),
                cluster.region.as_str()
            ),
            certificate_authority: STANDARD.encode(SIMULATED_CA),
        })
    }
}
