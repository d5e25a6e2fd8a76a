use async_trait::async_trait;
use jit_application::AccessJobRepository;
use jit_core::{AppError, AppResult};
use jit_domain::AccessJob;
use sqlx::PgPool;
use sqlx::types::Json;

use crate::postgres_errors::{map_sqlx_error, version_from_column, version_to_column};

/// PostgreSQL-backed access job store.
#[derive(Clone)]
pub struct PostgresAccessJobRepository {
    pool: PgPool,
}

impl PostgresAccessJobRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, column: &str, value: &str) -> AppResult<Option<AccessJob>> {
        let sql = format!(
            "SELECT document, resource_version FROM jit_access_jobs WHERE {column} = $1 LIMIT 1"
        );
        sqlx::query_as::<_, (Json<AccessJob>, i64)>(sql.as_str())
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("load access job", error))?
            .map(from_row)
            .transpose()
    }
}

fn from_row((document, resource_version): (Json<AccessJob>, i64)) -> AppResult<AccessJob> {
    Ok(document
        .0
        .with_resource_version(version_from_column(resource_version)?))
}

#[async_trait]
impl AccessJobRepository for PostgresAccessJobRepository {
    async fn create(&self, job: AccessJob) -> AppResult<AccessJob> {
        let stored = job.with_resource_version(1);

        sqlx::query(
            r#"
            INSERT INTO jit_access_jobs (
                id,
                request_ref,
                session_name,
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
        .bind(stored.request_ref())
        .bind(stored.session_name().map(|name| name.as_str()))
        .bind(stored.phase().as_str())
        .bind(version_to_column(stored.resource_version())?)
        .bind(Json(&stored))
        .bind(stored.created_at())
        .bind(stored.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("create access job", error))?;

        Ok(stored)
    }

    async fn find(&self, id: &str) -> AppResult<Option<AccessJob>> {
        self.find_where("id", id).await
    }

    async fn find_by_request(&self, request_id: &str) -> AppResult<Option<AccessJob>> {
        self.find_where("request_ref", request_id).await
    }

    async fn find_by_session_name(&self, session_name: &str) -> AppResult<Option<AccessJob>> {
        self.find_where("session_name", session_name).await
    }

    async fn update(&self, job: AccessJob) -> AppResult<AccessJob> {
        let expected_version = job.resource_version();
        let stored = job.with_resource_version(expected_version + 1);

        let result = sqlx::query(
            r#"
            UPDATE jit_access_jobs
            SET session_name = $2,
                phase = $3,
                resource_version = $4,
                document = $5,
                updated_at = $6
            WHERE id = $1 AND resource_version = $7
            "#,
        )
        .bind(stored.id())
        .bind(stored.session_name().map(|name| name.as_str()))
        .bind(stored.phase().as_str())
        .bind(version_to_column(stored.resource_version())?)
        .bind(Json(&stored))
        .bind(stored.updated_at())
        .bind(version_to_column(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("update access job", error))?;

        if result.rows_affected() == 0 {
            if self.find(stored.id()).await?.is_some() {
                return Err(AppError::Conflict(format!(
                    "job '{}' was modified concurrently (version {expected_version})",
                    stored.id()
                )));
            }
            return Err(AppError::NotFound(format!("job '{}'", stored.id())));
        }

        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM jit_access_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("delete access job", error))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> AppResult<Vec<AccessJob>> {
        sqlx::query_as::<_, (Json<AccessJob>, i64)>(
            r#"
            SELECT document, resource_version
            FROM jit_access_jobs
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("list access jobs", error))?
        .into_iter()
        .map(from_row)
        .collect()
    }
}
