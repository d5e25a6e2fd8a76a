use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use jit_application::{RoleRegistry, TeamDirectory};
use jit_core::AppResult;
use jit_domain::{OperatorRole, TeamName, UserId};
use tokio::sync::RwLock;

/// In-memory operator role table and team directory.
#[derive(Debug)]
pub struct InMemoryRoleRegistry {
    roles: RwLock<HashMap<UserId, OperatorRole>>,
    teams: RwLock<BTreeMap<TeamName, BTreeSet<UserId>>>,
    default_role: OperatorRole,
}

impl InMemoryRoleRegistry {
    /// Creates a registry seeded with role bindings and team membership.
    #[must_use]
    pub fn new(
        roles: HashMap<UserId, OperatorRole>,
        teams: BTreeMap<TeamName, BTreeSet<UserId>>,
        default_role: OperatorRole,
    ) -> Self {
        Self {
            roles: RwLock::new(roles),
            teams: RwLock::new(teams),
            default_role,
        }
    }
}

impl Default for InMemoryRoleRegistry {
    fn default() -> Self {
        Self::new(HashMap::new(), BTreeMap::new(), OperatorRole::Requester)
    }
}

#[async_trait]
impl RoleRegistry for InMemoryRoleRegistry {
    async fn role_for(&self, user_id: &UserId) -> AppResult<OperatorRole> {
        Ok(self
            .roles
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(self.default_role))
    }

    async fn assign_role(&self, user_id: &UserId, role: OperatorRole) -> AppResult<()> {
        self.roles.write().await.insert(user_id.clone(), role);
        Ok(())
    }

    async fn teams(&self) -> AppResult<TeamDirectory> {
        Ok(TeamDirectory::new(self.teams.read().await.clone()))
    }
}
