use jit_core::AppError;

/// Maps a database error onto the application taxonomy.
///
/// Pool exhaustion and connection loss are retryable; unique violations
/// surface as conflicts.
pub(crate) fn map_sqlx_error(action: &str, error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            AppError::Transient(format!("failed to {action}: {error}"))
        }
        sqlx::Error::Database(database_error) if database_error.is_unique_violation() => {
            AppError::Conflict(format!("failed to {action}: {error}"))
        }
        _ => AppError::Internal(format!("failed to {action}: {error}")),
    }
}

pub(crate) fn version_to_column(resource_version: u64) -> Result<i64, AppError> {
    i64::try_from(resource_version)
        .map_err(|_| AppError::Internal(format!("resource version {resource_version} overflows")))
}

pub(crate) fn version_from_column(resource_version: i64) -> Result<u64, AppError> {
    u64::try_from(resource_version).map_err(|_| {
        AppError::Internal(format!(
            "stored resource version {resource_version} is negative"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_retryable() {
        let error = map_sqlx_error("load request", sqlx::Error::PoolTimedOut);
        assert!(error.is_retryable());
        assert!(matches!(
            map_sqlx_error("load request", sqlx::Error::RowNotFound),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn negative_versions_are_rejected() {
        assert_eq!(version_from_column(3).ok(), Some(3));
        assert!(version_from_column(-1).is_err());
    }
}
