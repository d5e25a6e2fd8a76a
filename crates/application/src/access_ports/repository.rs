use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use jit_core::AppResult;
use jit_domain::{
    AccessJob, AccessRequest, Cluster, ClusterName, OperatorRole, RequestPhase, TeamName, UserId,
};

/// Filter for listing access requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequestQuery {
    /// Only requests filed by this user.
    pub requester_id: Option<UserId>,
    /// Only requests targeting this cluster.
    pub cluster: Option<ClusterName>,
    /// Only requests in one of these phases.
    pub phases: Option<Vec<RequestPhase>>,
}

impl AccessRequestQuery {
    /// Returns whether a request passes the filter.
    #[must_use]
    pub fn matches(&self, request: &AccessRequest) -> bool {
        self.requester_id
            .as_ref()
            .is_none_or(|requester_id| request.requester_id() == requester_id)
            && self
                .cluster
                .as_ref()
                .is_none_or(|cluster| &request.target().name == cluster)
            && self
                .phases
                .as_ref()
                .is_none_or(|phases| phases.contains(&request.phase()))
    }
}

/// Repository port for access requests.
///
/// Updates are compare-and-swap on `resource_version`: a stale write fails
/// with `Conflict` and the stored copy is returned with the next version.
#[async_trait]
pub trait AccessRequestRepository: Send + Sync {
    /// Stores a new request; fails with `Conflict` when the id exists.
    async fn create(&self, request: AccessRequest) -> AppResult<AccessRequest>;

    /// Returns one request by id.
    async fn find(&self, id: &str) -> AppResult<Option<AccessRequest>>;

    /// Replaces a request when its version still matches.
    async fn update(&self, request: AccessRequest) -> AppResult<AccessRequest>;

    /// Deletes a request and returns whether it existed.
    async fn delete(&self, id: &str) -> AppResult<bool>;

    /// Lists requests passing the filter, newest first.
    async fn list(&self, query: &AccessRequestQuery) -> AppResult<Vec<AccessRequest>>;
}

/// Repository port for access jobs, keyed by job id.
#[async_trait]
pub trait AccessJobRepository: Send + Sync {
    /// Stores a new job; fails with `Conflict` when the request already owns one.
    async fn create(&self, job: AccessJob) -> AppResult<AccessJob>;

    /// Returns one job by id.
    async fn find(&self, id: &str) -> AppResult<Option<AccessJob>>;

    /// Returns the job owned by a request.
    async fn find_by_request(&self, request_id: &str) -> AppResult<Option<AccessJob>>;

    /// Returns the job that issued a session name.
    async fn find_by_session_name(&self, session_name: &str) -> AppResult<Option<AccessJob>>;

    /// Replaces a job when its version still matches.
    async fn update(&self, job: AccessJob) -> AppResult<AccessJob>;

    /// Deletes a job and returns whether it existed.
    async fn delete(&self, id: &str) -> AppResult<bool>;

    /// Lists every stored job.
    async fn list(&self) -> AppResult<Vec<AccessJob>>;
}

/// Repository port for the cluster registry.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Inserts or replaces a cluster; fails with `Conflict` on a name clash.
    async fn save(&self, cluster: Cluster) -> AppResult<()>;

    /// Returns one cluster by id.
    async fn find(&self, id: &str) -> AppResult<Option<Cluster>>;

    /// Returns one cluster by name.
    async fn find_by_name(&self, name: &ClusterName) -> AppResult<Option<Cluster>>;

    /// Lists all clusters ordered by name.
    async fn list(&self) -> AppResult<Vec<Cluster>>;

    /// Deletes a cluster and returns whether it existed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}

/// Snapshot of team membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamDirectory {
    teams: BTreeMap<TeamName, BTreeSet<UserId>>,
}

impl TeamDirectory {
    /// Creates a directory from team to member sets.
    #[must_use]
    pub fn new(teams: BTreeMap<TeamName, BTreeSet<UserId>>) -> Self {
        Self { teams }
    }

    /// Returns whether `user_id` belongs to `team`.
    #[must_use]
    pub fn is_member(&self, team: &TeamName, user_id: &UserId) -> bool {
        self.teams
            .get(team)
            .is_some_and(|members| members.contains(user_id))
    }
}

/// Operator role table guarded by a readers-writer lock.
#[async_trait]
pub trait RoleRegistry: Send + Sync {
    /// Returns the role bound to a user, falling back to the default role.
    async fn role_for(&self, user_id: &UserId) -> AppResult<OperatorRole>;

    /// Binds a role to a user.
    async fn assign_role(&self, user_id: &UserId, role: OperatorRole) -> AppResult<()>;

    /// Returns the current team membership snapshot.
    async fn teams(&self) -> AppResult<TeamDirectory>;
}
