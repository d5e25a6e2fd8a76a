use async_trait::async_trait;
use jit_application::{AccessRequestQuery, AccessRequestRepository};
use jit_core::{AppError, AppResult};
use jit_domain::AccessRequest;
use sqlx::PgPool;
use sqlx::types::Json;

use crate::postgres_errors::{map_sqlx_error, version_from_column, version_to_column};

/// PostgreSQL-backed access request store.
///
/// Each request is stored as a JSON document next to the columns used for
/// filtering; `resource_version` guards every update.
#[derive(Clone)]
pub struct PostgresAccessRequestRepository {
    pool: PgPool,
}

impl PostgresAccessRequestRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: &str) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM jit_access_requests WHERE id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("check access request", error))
    }
}

fn from_row((document, resource_version): (Json<AccessRequest>, i64)) -> AppResult<AccessRequest> {
    Ok(document
        .0
        .with_resource_version(version_from_column(resource_version)?))
}

#[async_trait]
impl AccessRequestRepository for PostgresAccessRequestRepository {
    async fn create(&self, request: AccessRequest) -> AppResult<AccessRequest> {
        let stored = request.with_resource_version(1);

        sqlx::query(
            r#"
            INSERT INTO jit_access_requests (
                id,
                requester_id,
                cluster_name,
                phase,
                resource_version,
                document,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(stored.id())
        .bind(stored.requester_id().as_str())
        .bind(stored.target().name.as_str())
        .bind(stored.phase().as_str())
        .bind(version_to_column(stored.resource_version())?)
        .bind(Json(&stored))
        .bind(stored.created_at())
        .bind(stored.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("create access request", error))?;

        Ok(stored)
    }

    async fn find(&self, id: &str) -> AppResult<Option<AccessRequest>> {
        sqlx::query_as::<_, (Json<AccessRequest>, i64)>(
            r#"
            SELECT document, resource_version
            FROM jit_access_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("load access request", error))?
        .map(from_row)
        .transpose()
    }

    async fn update(&self, request: AccessRequest) -> AppResult<AccessRequest> {
        let expected_version = request.resource_version();
        let stored = request.with_resource_version(expected_version + 1);

        let result = sqlx::query(
            r#"
            UPDATE jit_access_requests
            SET phase = $2,
                resource_version = $3,
                document = $4,
                updated_at = $5
            WHERE id = $1 AND resource_version = $6
            "#,
        )
        .bind(stored.id())
        .bind(stored.phase().as_str())
        .bind(version_to_column(stored.resource_version())?)
        .bind(Json(&stored))
        .bind(stored.updated_at())
        .bind(version_to_column(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("update access request", error))?;

        if result.rows_affected() == 0 {
            if self.exists(stored.id()).await? {
                return Err(AppError::Conflict(format!(
                    "access request '{}' was modified concurrently (version {expected_version})",
                    stored.id()
                )));
            }
            return Err(AppError::NotFound(format!("access request '{}'", stored.id())));
        }

        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM jit_access_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("delete access request", error))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &AccessRequestQuery) -> AppResult<Vec<AccessRequest>> {
        let phases = query.phases.as_ref().map(|phases| {
            phases
                .iter()
                .map(|phase| phase.as_str().to_owned())
                .collect::<Vec<_>>()
        });

        sqlx::query_as::<_, (Json<AccessRequest>, i64)>(
            r#"
            SELECT document, resource_version
            FROM jit_access_requests
            WHERE ($1::TEXT IS NULL OR requester_id = $1)
              AND ($2::TEXT IS NULL OR cluster_name = $2)
              AND ($3::TEXT[] IS NULL OR phase = ANY($3))
            ORDER BY created_at DESC
            "#,
        )
        .bind(query.requester_id.as_ref().map(|user_id| user_id.as_str()))
        .bind(query.cluster.as_ref().map(|cluster| cluster.as_str()))
        .bind(phases)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("list access requests", error))?
        .into_iter()
        .map(from_row)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use jit_domain::{RequestPhase, UserId};

    use super::*;
    use crate::test_fixtures::{request, test_pool, unique_id};

    #[tokio::test]
    async fn versioned_update_and_filtered_listing() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let repository = PostgresAccessRequestRepository::new(pool);
        let id = unique_id("req");
        let requester = "U9000000001";

        let stored = match repository.create(request(id.as_str(), requester, 0)).await {
            Ok(stored) => stored,
            Err(error) => panic!("failed to create request: {error}"),
        };
        let duplicate = repository.create(request(id.as_str(), requester, 0)).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let mut approved = stored.clone();
        let _ = approved.approve("AutoApproved", "view on dev", stored.created_at());
        let updated = repository.update(approved).await;
        assert_eq!(updated.map(|request| request.resource_version()).ok(), Some(2));

        let stale = repository.update(stored).await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));

        let listed = repository
            .list(&AccessRequestQuery {
                requester_id: UserId::new(requester).ok(),
                phases: Some(vec![RequestPhase::Approved]),
                ..AccessRequestQuery::default()
            })
            .await
            .unwrap_or_default();
        assert!(listed.iter().any(|request| request.id() == id));

        assert_eq!(repository.delete(id.as_str()).await.ok(), Some(true));
        assert_eq!(repository.find(id.as_str()).await.ok(), Some(None));
    }
}
