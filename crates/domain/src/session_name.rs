use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDateTime, Utc};
use jit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{ClusterName, UserId};

const PREFIX: &str = "jit-";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LENGTH: usize = 15;

/// Deterministic session name `jit-<requester>-<cluster>-<yyyymmdd-hhmmss>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

/// Fields recovered from a session name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNameParts {
    /// Requester segment.
    pub requester: String,
    /// Cluster segment, possibly truncated.
    pub cluster: String,
    /// Second-precision start time.
    pub started_at: DateTime<Utc>,
}

impl SessionName {
    /// Cloud limit on role session names.
    pub const MAX_LENGTH: usize = 64;

    /// Builds the session name for a grant starting at `started_at`.
    ///
    /// The cluster segment is truncated so the whole name fits the cloud limit.
    #[must_use]
    pub fn build(requester: &UserId, cluster: &ClusterName, started_at: DateTime<Utc>) -> Self {
        let timestamp = started_at.format(TIMESTAMP_FORMAT).to_string();
        let fixed = PREFIX.len() + requester.as_str().len() + timestamp.len() + 2;
        let budget = Self::MAX_LENGTH.saturating_sub(fixed);
        let cluster_segment = cluster
            .as_str()
            .chars()
            .take(budget)
            .collect::<String>();

        Self(format!(
            "{PREFIX}{}-{cluster_segment}-{timestamp}",
            requester.as_str()
        ))
    }

    /// Returns whether a raw session name carries the managed prefix.
    #[must_use]
    pub fn is_managed(value: &str) -> bool {
        value.starts_with(PREFIX)
    }

    /// Splits the name into requester, cluster and start time.
    pub fn parts(&self) -> AppResult<SessionNameParts> {
        parse_parts(self.0.as_str())
    }

    /// Returns the session name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn parse_parts(value: &str) -> AppResult<SessionNameParts> {
    let invalid = || AppError::Validation(format!("session name '{value}' is not a managed name"));

    let body = value.strip_prefix(PREFIX).ok_or_else(invalid)?;
    if body.len() < TIMESTAMP_LENGTH + 2 || !body.is_char_boundary(body.len() - TIMESTAMP_LENGTH)
    {
        return Err(invalid());
    }

    let (head, timestamp) = body.split_at(body.len() - TIMESTAMP_LENGTH);
    let head = head.strip_suffix('-').ok_or_else(invalid)?;
    let (requester, cluster) = head.split_once('-').ok_or_else(invalid)?;
    if requester.is_empty() || cluster.is_empty() {
        return Err(invalid());
    }

    let started_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| invalid())?
        .and_utc();

    Ok(SessionNameParts {
        requester: requester.to_owned(),
        cluster: cluster.to_owned(),
        started_at,
    })
}

impl Display for SessionName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for SessionName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() > Self::MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "session name '{value}' exceeds {} characters",
                Self::MAX_LENGTH
            )));
        }
        parse_parts(value.as_str())?;
        Ok(Self(value))
    }
}

impl From<SessionName> for String {
    fn from(value: SessionName) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn user() -> UserId {
        UserId::new("U0000000001").unwrap_or_else(|_| unreachable!())
    }

    fn started_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 5)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    #[test]
    fn builds_and_parses_hyphenated_cluster() {
        let cluster = ClusterName::new("dev-east-1").unwrap_or_else(|_| unreachable!());
        let name = SessionName::build(&user(), &cluster, started_at());

        assert_eq!(name.as_str(), "jit-U0000000001-dev-east-1-20250101-093005");

        let parts = name.parts().unwrap_or_else(|_| unreachable!());
        assert_eq!(parts.requester, "U0000000001");
        assert_eq!(parts.cluster, "dev-east-1");
        assert_eq!(parts.started_at, started_at());
    }

    #[test]
    fn long_cluster_names_are_truncated_to_limit() {
        let cluster = ClusterName::new("a".repeat(90)).unwrap_or_else(|_| unreachable!());
        let name = SessionName::build(&user(), &cluster, started_at());

        assert_eq!(name.as_str().len(), SessionName::MAX_LENGTH);
        assert!(name.parts().is_ok());
    }

    #[test]
    fn parses_orphan_entry_names() {
        let name = SessionName::try_from("jit-U0000000001-ghost-20250101-000000".to_owned());
        let parts = name
            .and_then(|name| name.parts())
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(parts.cluster, "ghost");
    }

    #[test]
    fn rejects_unmanaged_names() {
        assert!(!SessionName::is_managed("admin-session"));
        assert!(SessionName::try_from("jit-broken".to_owned()).is_err());
        assert!(SessionName::try_from("jit-U0000000001-dev-2025-0101".to_owned()).is_err());
    }
}
