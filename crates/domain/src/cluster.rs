use std::str::FromStr;

use jit_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::{AccessDuration, AccountId, ClusterName, ClusterTarget, Region};

/// Deployment tier of a managed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production tier.
    #[serde(alias = "prod")]
    Production,
    /// Pre-production tier.
    #[serde(alias = "stage")]
    Staging,
    /// Development tier.
    #[serde(alias = "dev")]
    Development,
}

impl Environment {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

impl FromStr for Environment {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" | "stage" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(AppError::Validation(format!(
                "unknown environment '{value}'"
            ))),
        }
    }
}

/// Input payload for registering or updating a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInput {
    /// Cluster name, unique within the registry.
    pub name: String,
    /// Human friendly name.
    pub display_name: Option<String>,
    /// Owning account.
    pub account: String,
    /// Hosting region.
    pub region: String,
    /// Deployment tier.
    pub environment: Environment,
    /// Longest grant allowed on this cluster.
    pub max_duration: Option<String>,
    /// Minimum distinct approvals for requests that are not auto-approved.
    #[serde(default)]
    pub required_approvers_count: u32,
    /// Whether new requests are accepted.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Operator-managed registry entry for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    id: String,
    name: ClusterName,
    display_name: NonEmptyString,
    account: AccountId,
    region: Region,
    environment: Environment,
    max_duration: AccessDuration,
    required_approvers_count: u32,
    enabled: bool,
}

impl Cluster {
    /// Creates a validated cluster entry.
    pub fn new(id: impl Into<String>, input: ClusterInput) -> AppResult<Self> {
        let name = ClusterName::new(input.name)?;
        let display_name = NonEmptyString::new(
            input
                .display_name
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| name.as_str().to_owned()),
        )?;
        let max_duration = match input.max_duration {
            Some(value) => AccessDuration::parse_bounded(value.as_str())?,
            None => AccessDuration::MAX,
        };

        Ok(Self {
            id: NonEmptyString::new(id)?.into(),
            name,
            display_name,
            account: AccountId::new(input.account)?,
            region: Region::new(input.region)?,
            environment: input.environment,
            max_duration,
            required_approvers_count: input.required_approvers_count,
            enabled: input.enabled,
        })
    }

    /// Returns the registry identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn name(&self) -> &ClusterName {
        &self.name
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the owning account.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Returns the hosting region.
    #[must_use]
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Returns the deployment tier.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the longest grant allowed.
    #[must_use]
    pub fn max_duration(&self) -> AccessDuration {
        self.max_duration
    }

    /// Returns the approval floor.
    #[must_use]
    pub fn required_approvers_count(&self) -> u32 {
        self.required_approvers_count
    }

    /// Returns whether requests are accepted.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the addressable target.
    #[must_use]
    pub fn target(&self) -> ClusterTarget {
        ClusterTarget {
            name: self.name.clone(),
            account: self.account.clone(),
            region: self.region.clone(),
        }
    }
}
