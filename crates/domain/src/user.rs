//! Operator identity types and validation rules.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use jit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Chat user identifier, `U` followed by ten upper-case alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Number of characters after the leading `U`.
    pub const SUFFIX_LENGTH: usize = 10;

    /// Creates a validated user identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if !is_user_id(value.as_str()) {
            return Err(AppError::Validation(format!(
                "user id '{value}' must match U[A-Z0-9]{{10}}"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for UserId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

fn is_user_id(value: &str) -> bool {
    let Some(suffix) = value.strip_prefix('U') else {
        return false;
    };

    suffix.len() == UserId::SUFFIX_LENGTH
        && suffix
            .chars()
            .all(|character| character.is_ascii_uppercase() || character.is_ascii_digit())
}

/// Validated email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated email address.
    ///
    /// Performs structural validation: exactly one `@`, non-empty local part
    /// without whitespace, and a dotted domain made of DNS label characters.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim().to_lowercase();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "email address must not be empty".to_owned(),
            ));
        }

        if trimmed.len() > 254 {
            return Err(AppError::Validation(
                "email address must not exceed 254 characters".to_owned(),
            ));
        }

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        };

        if domain.contains('@') {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        }

        if local.is_empty() || local.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(
                "email local part must be non-empty and contain no whitespace".to_owned(),
            ));
        }

        let labels_valid = domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|character| character.is_ascii_alphanumeric() || character == '-')
        });
        if !domain.contains('.') || !labels_valid {
            return Err(AppError::Validation(format!(
                "email domain '{domain}' is not a valid dotted domain"
            )));
        }

        Ok(Self(trimmed))
    }

    /// Returns the validated email string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// Team identifier used as an approver group, e.g. `platform-team`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TeamName(String);

impl TeamName {
    /// Creates a validated team name matching `[a-z][a-z0-9-]*[a-z0-9]`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if !is_team_name(value.as_str()) {
            return Err(AppError::Validation(format!(
                "team name '{value}' must match [a-z][a-z0-9-]*[a-z0-9]"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the underlying team name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for TeamName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TeamName> for String {
    fn from(value: TeamName) -> Self {
        value.0
    }
}

fn is_team_name(value: &str) -> bool {
    let bytes = value.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };

    bytes.len() >= 2
        && first.is_ascii_lowercase()
        && (last.is_ascii_lowercase() || last.is_ascii_digit())
        && bytes
            .iter()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || *byte == b'-')
}

/// Identity that can appear in a request's required approver set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApproverId {
    /// A single chat user.
    User(UserId),
    /// Any member of a team.
    Team(TeamName),
}

impl ApproverId {
    /// Returns the transport representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User(user_id) => user_id.as_str(),
            Self::Team(team) => team.as_str(),
        }
    }
}

impl FromStr for ApproverId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if is_user_id(value) {
            return Ok(Self::User(UserId(value.to_owned())));
        }

        if is_team_name(value) {
            return Ok(Self::Team(TeamName(value.to_owned())));
        }

        Err(AppError::Validation(format!(
            "approver '{value}' must be a user id or a team name"
        )))
    }
}

impl Display for ApproverId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for ApproverId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<ApproverId> for String {
    fn from(value: ApproverId) -> Self {
        value.as_str().to_owned()
    }
}
