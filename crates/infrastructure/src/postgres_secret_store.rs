use async_trait::async_trait;
use jit_application::SecretStore;
use jit_core::AppResult;
use sqlx::PgPool;

use crate::aes_secret_cipher::AesSecretCipher;
use crate::postgres_errors::map_sqlx_error;

/// PostgreSQL-backed secret store; values are sealed before they leave the process.
#[derive(Clone)]
pub struct PostgresSecretStore {
    pool: PgPool,
    cipher: AesSecretCipher,
}

impl PostgresSecretStore {
    /// Creates a store with the provided connection pool and cipher.
    #[must_use]
    pub fn new(pool: PgPool, cipher: AesSecretCipher) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl SecretStore for PostgresSecretStore {
    async fn put(&self, key: &str, value: &[u8]) -> AppResult<()> {
        let sealed = self.cipher.seal(value)?;

        sqlx::query(
            r#"
            INSERT INTO jit_secrets (key, sealed_value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET sealed_value = EXCLUDED.sealed_value,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(sealed)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("store secret", error))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let sealed = sqlx::query_scalar::<_, Vec<u8>>(
            r#"
            SELECT sealed_value
            FROM jit_secrets
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("load secret", error))?;

        sealed
            .map(|sealed| self.cipher.open(sealed.as_slice()))
            .transpose()
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM jit_secrets
            WHERE key = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("delete secret", error))?;

        Ok(())
    }
}
