use async_trait::async_trait;
use jit_application::ClusterRepository;
use jit_core::AppResult;
use jit_domain::{Cluster, ClusterName};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::postgres_errors::map_sqlx_error;

/// PostgreSQL-backed cluster registry.
#[derive(Clone)]
pub struct PostgresClusterRepository {
    pool: PgPool,
}

impl PostgresClusterRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClusterRepository for PostgresClusterRepository {
    async fn save(&self, cluster: Cluster) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jit_clusters (id, name, document, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                document = EXCLUDED.document,
                updated_at = now()
            "#,
        )
        .bind(cluster.id())
        .bind(cluster.name().as_str())
        .bind(Json(&cluster))
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("save cluster", error))?;

        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<Cluster>> {
        let document = sqlx::query_scalar::<_, Json<Cluster>>(
            r#"
            SELECT document
            FROM jit_clusters
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("load cluster", error))?;

        Ok(document.map(|document| document.0))
    }

    async fn find_by_name(&self, name: &ClusterName) -> AppResult<Option<Cluster>> {
        let document = sqlx::query_scalar::<_, Json<Cluster>>(
            r#"
            SELECT document
            FROM jit_clusters
            WHERE name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("load cluster by name", error))?;

        Ok(document.map(|document| document.0))
    }

    async fn list(&self) -> AppResult<Vec<Cluster>> {
        let documents = sqlx::query_scalar::<_, Json<Cluster>>(
            r#"
            SELECT document
            FROM jit_clusters
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("list clusters", error))?;

        Ok(documents.into_iter().map(|document| document.0).collect())
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM jit_clusters
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("delete cluster", error))?;

        Ok(result.rows_affected() > 0)
    }
}
