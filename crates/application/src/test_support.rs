//! Hand-written port fakes shared by the service tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jit_core::{AppError, AppResult, CallerIdentity};
use jit_domain::{
    AccessJob, AccessRequest, Cluster, ClusterInput, ClusterName, ClusterTarget, EmailAddress,
    Environment, OperatorRole, TeamName, UserId,
};
use tokio::sync::Mutex;

use crate::access_ports::{
    AccessBinding, AccessJobRepository, AccessRequestQuery, AccessRequestRepository, ChatGateway,
    Clock, ClusterAccessBinder, ClusterDescription, ClusterRepository, ManualClock,
    MintSessionInput, ReconcileKey, ReconcileTrigger, RoleRegistry, SecretStore,
    SessionCredentials, SessionMinter, TeamDirectory,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

pub fn user(number: u32) -> UserId {
    UserId::new(format!("U{number:0>10}")).unwrap_or_else(|_| unreachable!())
}

pub fn caller(number: u32) -> CallerIdentity {
    let user_id = user(number);
    CallerIdentity::new(user_id.as_str(), format!("user-{number}"), None)
}

pub fn cluster(name: &str, environment: Environment) -> Cluster {
    Cluster::new(
        format!("id-{name}"),
        ClusterInput {
            name: name.to_owned(),
            display_name: None,
            account: "123456789012".to_owned(),
            region: "us-east-1".to_owned(),
            environment,
            max_duration: None,
            required_approvers_count: 0,
            enabled: true,
        },
    )
    .unwrap_or_else(|_| unreachable!())
}

pub fn team(name: &str) -> TeamName {
    TeamName::new(name).unwrap_or_else(|_| unreachable!())
}

#[derive(Default)]
pub struct FakeRequestRepository {
    pub requests: Mutex<BTreeMap<String, AccessRequest>>,
}

#[async_trait]
impl AccessRequestRepository for FakeRequestRepository {
    async fn create(&self, request: AccessRequest) -> AppResult<AccessRequest> {
        let mut requests = self.requests.lock().await;
        if requests.contains_key(request.id()) {
            return Err(AppError::Conflict(format!("request '{}' exists", request.id())));
        }
        let stored = request.with_resource_version(1);
        requests.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: &str) -> AppResult<Option<AccessRequest>> {
        Ok(self.requests.lock().await.get(id).cloned())
    }

    async fn update(&self, request: AccessRequest) -> AppResult<AccessRequest> {
        let mut requests = self.requests.lock().await;
        let current = requests
            .get(request.id())
            .ok_or_else(|| AppError::NotFound(format!("request '{}'", request.id())))?;
        if current.resource_version() != request.resource_version() {
            return Err(AppError::Conflict(format!("request '{}' is stale", request.id())));
        }
        let next_version = request.resource_version() + 1;
        let stored = request.with_resource_version(next_version);
        requests.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.requests.lock().await.remove(id).is_some())
    }

    async fn list(&self, query: &AccessRequestQuery) -> AppResult<Vec<AccessRequest>> {
        Ok(self
            .requests
            .lock()
            .await
            .values()
            .filter(|request| query.matches(request))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeJobRepository {
    pub jobs: Mutex<BTreeMap<String, AccessJob>>,
}

#[async_trait]
impl AccessJobRepository for FakeJobRepository {
    async fn create(&self, job: AccessJob) -> AppResult<AccessJob> {
        let mut jobs = self.jobs.lock().await;
        if jobs.values().any(|stored| stored.request_ref() == job.request_ref()) {
            return Err(AppError::Conflict(format!(
                "request '{}' already owns a job",
                job.request_ref()
            )));
        }
        let stored = job.with_resource_version(1);
        jobs.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: &str) -> AppResult<Option<AccessJob>> {
        Ok(self.jobs.lock().await.get(id).cloned())
    }

    async fn find_by_request(&self, request_id: &str) -> AppResult<Option<AccessJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .find(|job| job.request_ref() == request_id)
            .cloned())
    }

    async fn find_by_session_name(&self, session_name: &str) -> AppResult<Option<AccessJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .find(|job| job.session_name().is_some_and(|name| name.as_str() == session_name))
            .cloned())
    }

    async fn update(&self, job: AccessJob) -> AppResult<AccessJob> {
        let mut jobs = self.jobs.lock().await;
        let current = jobs
            .get(job.id())
            .ok_or_else(|| AppError::NotFound(format!("job '{}'", job.id())))?;
        if current.resource_version() != job.resource_version() {
            return Err(AppError::Conflict(format!("job '{}' is stale", job.id())));
        }
        if let Some(name) = job.session_name()
            && jobs
                .values()
                .any(|stored| stored.id() != job.id() && stored.session_name() == Some(name))
        {
            return Err(AppError::Conflict(format!("session name '{name}' is taken")));
        }
        let next_version = job.resource_version() + 1;
        let stored = job.with_resource_version(next_version);
        jobs.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.jobs.lock().await.remove(id).is_some())
    }

    async fn list(&self) -> AppResult<Vec<AccessJob>> {
        Ok(self.jobs.lock().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeClusterRepository {
    pub clusters: Mutex<BTreeMap<String, Cluster>>,
}

impl FakeClusterRepository {
    pub async fn with(clusters: Vec<Cluster>) -> Arc<Self> {
        let repository = Arc::new(Self::default());
        for cluster in clusters {
            let _ = repository.save(cluster).await;
        }
        repository
    }
}

#[async_trait]
impl ClusterRepository for FakeClusterRepository {
    async fn save(&self, cluster: Cluster) -> AppResult<()> {
        let mut clusters = self.clusters.lock().await;
        if clusters
            .values()
            .any(|stored| stored.name() == cluster.name() && stored.id() != cluster.id())
        {
            return Err(AppError::Conflict(format!(
                "cluster '{}' exists",
                cluster.name()
            )));
        }
        clusters.insert(cluster.id().to_owned(), cluster);
        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<Cluster>> {
        Ok(self.clusters.lock().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &ClusterName) -> AppResult<Option<Cluster>> {
        Ok(self
            .clusters
            .lock()
            .await
            .values()
            .find(|cluster| cluster.name() == name)
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<Cluster>> {
        Ok(self.clusters.lock().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.clusters.lock().await.remove(id).is_some())
    }
}

#[derive(Default)]
pub struct FakeRoleRegistry {
    pub roles: Mutex<HashMap<UserId, OperatorRole>>,
    pub teams: Mutex<BTreeMap<TeamName, BTreeSet<UserId>>>,
}

impl FakeRoleRegistry {
    pub async fn with_team(self, name: &str, members: &[u32]) -> Self {
        self.teams
            .lock()
            .await
            .insert(team(name), members.iter().map(|number| user(*number)).collect());
        self
    }

    pub async fn with_role(self, number: u32, role: OperatorRole) -> Self {
        self.roles.lock().await.insert(user(number), role);
        self
    }
}

#[async_trait]
impl RoleRegistry for FakeRoleRegistry {
    async fn role_for(&self, user_id: &UserId) -> AppResult<OperatorRole> {
        Ok(self
            .roles
            .lock()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(OperatorRole::Requester))
    }

    async fn assign_role(&self, user_id: &UserId, role: OperatorRole) -> AppResult<()> {
        self.roles.lock().await.insert(user_id.clone(), role);
        Ok(())
    }

    async fn teams(&self) -> AppResult<TeamDirectory> {
        Ok(TeamDirectory::new(self.teams.lock().await.clone()))
    }
}

pub struct FakeSessionMinter {
    pub clock: Arc<ManualClock>,
    pub calls: Mutex<Vec<MintSessionInput>>,
    pub failure: Mutex<Option<AppError>>,
}

impl FakeSessionMinter {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionMinter for FakeSessionMinter {
    async fn mint(&self, input: MintSessionInput) -> AppResult<SessionCredentials> {
        if let Some(error) = self.failure.lock().await.clone() {
            return Err(error);
        }

        let seconds = i64::try_from(input.ttl.as_seconds()).unwrap_or(i64::MAX);
        let expires_at = self.clock.now() + chrono::TimeDelta::seconds(seconds);
        let mut calls = self.calls.lock().await;
        calls.push(input);

        Ok(SessionCredentials {
            access_key_id: format!("ASIA{:04}", calls.len()),
            secret_access_key: "secret".to_owned(),
            session_token: format!("token-{}", calls.len()),
            expires_at,
        })
    }
}

#[derive(Default)]
pub struct FakeClusterBinder {
    pub entries: Mutex<BTreeMap<(String, String), AccessBinding>>,
    pub foreign_entries: Mutex<BTreeSet<(String, String)>>,
    pub bind_failure: Mutex<Option<AppError>>,
    pub describe_failure: Mutex<Option<AppError>>,
    pub unbind_failure: Mutex<Option<AppError>>,
    pub unbind_calls: Mutex<Vec<String>>,
}

impl FakeClusterBinder {
    pub async fn principals(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .keys()
            .map(|(_, principal)| principal.clone())
            .collect()
    }

    pub async fn insert_foreign(&self, cluster: &str, principal: &str) {
        self.foreign_entries
            .lock()
            .await
            .insert((cluster.to_owned(), principal.to_owned()));
    }
}

#[async_trait]
impl ClusterAccessBinder for FakeClusterBinder {
    async fn bind(&self, binding: &AccessBinding) -> AppResult<()> {
        if let Some(error) = self.bind_failure.lock().await.clone() {
            return Err(error);
        }
        self.entries.lock().await.insert(
            (
                binding.cluster.name.as_str().to_owned(),
                binding.principal.clone(),
            ),
            binding.clone(),
        );
        Ok(())
    }

    async fn unbind(&self, cluster: &ClusterTarget, principal: &str) -> AppResult<()> {
        self.unbind_calls.lock().await.push(principal.to_owned());
        if let Some(error) = self.unbind_failure.lock().await.clone() {
            return Err(error);
        }

        let key = (cluster.name.as_str().to_owned(), principal.to_owned());
        let removed = self.entries.lock().await.remove(&key).is_some();
        let removed_foreign = self.foreign_entries.lock().await.remove(&key);
        if removed || removed_foreign {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("access entry '{principal}'")))
        }
    }

    async fn list_access_entries(&self, cluster: &ClusterTarget) -> AppResult<Vec<String>> {
        let mut principals = self
            .entries
            .lock()
            .await
            .keys()
            .filter(|(name, _)| name == cluster.name.as_str())
            .map(|(_, principal)| principal.clone())
            .collect::<Vec<_>>();
        principals.extend(
            self.foreign_entries
                .lock()
                .await
                .iter()
                .filter(|(name, _)| name == cluster.name.as_str())
                .map(|(_, principal)| principal.clone()),
        );
        Ok(principals)
    }

    async fn describe_cluster(&self, cluster: &ClusterTarget) -> AppResult<ClusterDescription> {
        if let Some(error) = self.describe_failure.lock().await.clone() {
            return Err(error);
        }

        Ok(ClusterDescription {
            name: cluster.name.as_str().to_owned(),
            arn: cluster.arn(),
            endpoint: format!("https://{}.eks.example.com", cluster.name),
            certificate_authority: "LS0tLS1CRUdJTg==".to_owned(),
        })
    }
}

#[derive(Default)]
pub struct FakeSecretStore {
    pub values: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Writes to keys ending with this suffix fail.
    pub failing_suffix: Mutex<Option<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn put(&self, key: &str, value: &[u8]) -> AppResult<()> {
        if let Some(suffix) = self.failing_suffix.lock().await.as_deref()
            && key.ends_with(suffix)
        {
            return Err(AppError::Transient(format!("secret '{key}' unavailable")));
        }
        self.values
            .lock()
            .await
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.deleted.lock().await.push(key.to_owned());
        self.values.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeChatGateway {
    pub messages: Mutex<Vec<(UserId, String)>>,
    pub emails: Mutex<HashMap<UserId, EmailAddress>>,
}

#[async_trait]
impl ChatGateway for FakeChatGateway {
    async fn notify_user(&self, user_id: &UserId, message: &str) -> AppResult<()> {
        self.messages
            .lock()
            .await
            .push((user_id.clone(), message.to_owned()));
        Ok(())
    }

    async fn lookup_email(&self, user_id: &UserId) -> AppResult<Option<EmailAddress>> {
        Ok(self.emails.lock().await.get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingTrigger {
    pub keys: Mutex<Vec<ReconcileKey>>,
}

#[async_trait]
impl ReconcileTrigger for RecordingTrigger {
    async fn enqueue(&self, key: ReconcileKey) {
        self.keys.lock().await.push(key);
    }
}
