//! Shared primitives for all Rust crates of the JIT access service.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::CallerIdentity;

/// Result type used across JIT access crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller identity is missing or could not be verified.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write conflicts with existing state, or a true duplicate.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Temporary failure; the operation may be retried with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// Access request rejected by request policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Cloud or cluster API rejected the call.
    #[error("external failure: {0}")]
    ExternalFailure(String),

    /// Misconfiguration that prevents startup.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether retrying the failed operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns a stable machine-readable reason used in status conditions.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::Transient(_) => "Transient",
            Self::PolicyViolation(_) => "PolicyViolation",
            Self::ExternalFailure(_) => "ExternalFailure",
            Self::Fatal(_) => "Fatal",
            Self::Internal(_) => "Internal",
        }
    }
}
