use std::fmt::{Display, Formatter};

use jit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Cloud account identifier, exactly twelve digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Creates a validated account identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.len() != 12 || !value.chars().all(|character| character.is_ascii_digit()) {
            return Err(AppError::Validation(format!(
                "account '{value}' must be exactly 12 digits"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the account number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for AccountId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

/// Cloud region such as `us-east-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    /// Creates a validated region, lower-casing the input first.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_lowercase();
        let segments = value.split('-').collect::<Vec<_>>();
        let valid = matches!(
            segments.as_slice(),
            [area, location, number]
                if area.len() == 2
                    && area.chars().all(|character| character.is_ascii_lowercase())
                    && !location.is_empty()
                    && location.chars().all(|character| character.is_ascii_lowercase())
                    && number.len() == 1
                    && number.chars().all(|character| character.is_ascii_digit())
        );

        if !valid {
            return Err(AppError::Validation(format!(
                "region '{value}' must match [a-z]{{2}}-[a-z]+-\\d"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the region code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Region {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Region> for String {
    fn from(value: Region) -> Self {
        value.0
    }
}

/// Managed cluster name, stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterName(String);

impl ClusterName {
    /// Maximum cluster name length accepted by the cloud provider.
    pub const MAX_LENGTH: usize = 100;

    /// Creates a validated cluster name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_lowercase();
        let starts_alphanumeric = value
            .chars()
            .next()
            .is_some_and(|character| character.is_ascii_alphanumeric());
        let charset_valid = value.chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || character == '-'
                || character == '_'
        });

        if !starts_alphanumeric || !charset_valid || value.len() > Self::MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "cluster name '{value}' must start alphanumeric and contain only [a-z0-9_-] (max {})",
                Self::MAX_LENGTH
            )));
        }

        Ok(Self(value))
    }

    /// Returns the cluster name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ClusterName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for ClusterName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClusterName> for String {
    fn from(value: ClusterName) -> Self {
        value.0
    }
}

/// Kubernetes namespace name (DNS-1123 label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Maximum namespace length.
    pub const MAX_LENGTH: usize = 63;

    /// Creates a validated namespace matching `[a-z0-9]([-a-z0-9]*[a-z0-9])?`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let bytes = value.as_bytes();
        let edges_valid = match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                (first.is_ascii_lowercase() || first.is_ascii_digit())
                    && (last.is_ascii_lowercase() || last.is_ascii_digit())
            }
            _ => false,
        };
        let charset_valid = bytes
            .iter()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || *byte == b'-');

        if !edges_valid || !charset_valid || value.len() > Self::MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "namespace '{value}' must match [a-z0-9]([-a-z0-9]*[a-z0-9])?"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the namespace name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for NamespaceName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NamespaceName> for String {
    fn from(value: NamespaceName) -> Self {
        value.0
    }
}

/// Cluster addressed by an access request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterTarget {
    /// Cluster name.
    pub name: ClusterName,
    /// Owning cloud account.
    pub account: AccountId,
    /// Cloud region hosting the cluster.
    pub region: Region,
}

impl ClusterTarget {
    /// Returns the cluster ARN used to scope session policies.
    #[must_use]
    pub fn arn(&self) -> String {
        format!(
            "arn:aws:eks:{}:{}:cluster/{}",
            self.region.as_str(),
            self.account.as_str(),
            self.name.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_requires_twelve_digits() {
        assert!(AccountId::new("123456789012").is_ok());
        assert!(AccountId::new("12345678901").is_err());
        assert!(AccountId::new("1234567890123").is_err());
        assert!(AccountId::new("12345678901a").is_err());
    }

    #[test]
    fn region_is_lowercased_and_validated() {
        let region = Region::new("US-EAST-1");
        assert_eq!(
            region.map(|value| value.as_str().to_owned()).ok(),
            Some("us-east-1".to_owned())
        );
        assert!(Region::new("useast1").is_err());
        assert!(Region::new("us-east-12").is_err());
        assert!(Region::new("usa-east-1").is_err());
    }

    #[test]
    fn namespace_grammar() {
        assert!(NamespaceName::new("default").is_ok());
        assert!(NamespaceName::new("team-a1").is_ok());
        assert!(NamespaceName::new("a").is_ok());
        assert!(NamespaceName::new("-leading").is_err());
        assert!(NamespaceName::new("trailing-").is_err());
        assert!(NamespaceName::new("Upper").is_err());
        assert!(NamespaceName::new("").is_err());
    }

    #[test]
    fn cluster_target_renders_arn() {
        let target = ClusterTarget {
            name: ClusterName::new("Dev-East-1").unwrap_or_else(|_| unreachable!()),
            account: AccountId::new("123456789012").unwrap_or_else(|_| unreachable!()),
            region: Region::new("us-east-1").unwrap_or_else(|_| unreachable!()),
        };

        assert_eq!(
            target.arn(),
            "arn:aws:eks:us-east-1:123456789012:cluster/dev-east-1"
        );
    }
}
