use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use async_trait::async_trait;
use jit_application::{RoleRegistry, TeamDirectory};
use jit_core::AppResult;
use jit_domain::{OperatorRole, TeamName, UserId};
use sqlx::PgPool;

use crate::postgres_errors::map_sqlx_error;

/// Role bindings persisted in PostgreSQL.
///
/// Team membership is static configuration and is held in memory.
#[derive(Clone)]
pub struct PostgresRoleRegistry {
    pool: PgPool,
    teams: TeamDirectory,
    default_role: OperatorRole,
}

impl PostgresRoleRegistry {
    /// Creates a registry over the provided pool.
    #[must_use]
    pub fn new(
        pool: PgPool,
        teams: BTreeMap<TeamName, BTreeSet<UserId>>,
        default_role: OperatorRole,
    ) -> Self {
        Self {
            pool,
            teams: TeamDirectory::new(teams),
            default_role,
        }
    }

    /// Binds roles that are not yet present; existing bindings win.
    pub async fn seed(&self, roles: &[(UserId, OperatorRole)]) -> AppResult<()> {
        for (user_id, role) in roles {
            sqlx::query(
                r#"
                INSERT INTO jit_operator_roles (user_id, role, updated_at)
                VALUES ($1, $2, now())
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(user_id.as_str())
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("seed operator role", error))?;
        }

        Ok(())
    }
}

#[async_trait]
impl RoleRegistry for PostgresRoleRegistry {
    async fn role_for(&self, user_id: &UserId) -> AppResult<OperatorRole> {
        let role = sqlx::query_scalar::<_, String>(
            r#"
            SELECT role
            FROM jit_operator_roles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("load operator role", error))?;

        match role {
            Some(role) => OperatorRole::from_str(role.as_str()),
            None => Ok(self.default_role),
        }
    }

    async fn assign_role(&self, user_id: &UserId, role: OperatorRole) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jit_operator_roles (user_id, role, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id) DO UPDATE
            SET role = EXCLUDED.role,
                updated_at = now()
            "#,
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("assign operator role", error))?;

        Ok(())
    }

    async fn teams(&self) -> AppResult<TeamDirectory> {
        Ok(self.teams.clone())
    }
}
