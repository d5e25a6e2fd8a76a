//! Port wiring shared by the API and worker binaries.

use std::sync::Arc;
use std::time::Duration;

use jit_application::{
    AccessJobRepository, AccessRequestRepository, AccessRequestService, AccessRequestServiceDeps,
    AuthorizationService, ChatGateway, Clock, ClusterAccessBinder, ClusterRepository,
    ClusterService, Controller, ExpirySweeper, GrantExecutor, ReconcileLeaseCoordinator,
    ReconcileTrigger, Reconciler, RoleRegistry, SecretStore, SessionMinter, SystemClock,
};
use jit_core::{AppError, AppResult};
use jit_domain::Cluster;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{CloudProvider, JitConfig, StorageBackend};
use crate::{
    AesSecretCipher, AwsEksAccessBinder, AwsSessionMinter, ConsoleChatGateway,
    InMemoryAccessJobRepository, InMemoryAccessRequestRepository, InMemoryClusterRepository,
    InMemoryRoleRegistry, InMemorySecretStore, PostgresAccessJobRepository,
    PostgresAccessRequestRepository, PostgresClusterRepository, PostgresRoleRegistry,
    PostgresSecretStore, RedisReconcileLeaseCoordinator, SimulatedCloud, SlackChatGateway,
    load_aws_config,
};

const LEASE_KEY_PREFIX: &str = "jit:reconcile";
const CHAT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Connects to PostgreSQL and applies pending migrations.
pub async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Fatal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Fatal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

/// Every adapter selected by the configuration, behind its port.
#[derive(Clone)]
pub struct AccessStack {
    config: JitConfig,
    /// Access request store.
    pub requests: Arc<dyn AccessRequestRepository>,
    /// Access job store.
    pub jobs: Arc<dyn AccessJobRepository>,
    /// Cluster registry.
    pub clusters: Arc<dyn ClusterRepository>,
    /// Sealed secret store.
    pub secrets: Arc<dyn SecretStore>,
    /// Operator roles and teams.
    pub roles: Arc<dyn RoleRegistry>,
    /// Cloud session minter.
    pub minter: Arc<dyn SessionMinter>,
    /// Cluster access binder.
    pub binder: Arc<dyn ClusterAccessBinder>,
    /// Chat gateway used for notifications and email lookup.
    pub chat: Arc<dyn ChatGateway>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Cross-replica reconcile leases, when `redis.url` is set.
    pub leases: Option<Arc<dyn ReconcileLeaseCoordinator>>,
}

impl AccessStack {
    /// Builds the adapters named by `config`, then seeds clusters and roles.
    pub async fn build(config: &JitConfig) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cipher = match config.secret_cipher()? {
            Some(cipher) => cipher,
            None => {
                warn!("storage.encryptionKey not set; secrets are sealed with a process-local key");
                AesSecretCipher::ephemeral()
            }
        };
        let role_bindings = config.role_bindings()?;
        let teams = config.team_directory()?;

        let (requests, jobs, clusters, secrets, roles): (
            Arc<dyn AccessRequestRepository>,
            Arc<dyn AccessJobRepository>,
            Arc<dyn ClusterRepository>,
            Arc<dyn SecretStore>,
            Arc<dyn RoleRegistry>,
        ) = match config.storage.backend {
            StorageBackend::Memory => (
                Arc::new(InMemoryAccessRequestRepository::new()),
                Arc::new(InMemoryAccessJobRepository::new()),
                Arc::new(InMemoryClusterRepository::new()),
                Arc::new(InMemorySecretStore::new(cipher)),
                Arc::new(InMemoryRoleRegistry::new(
                    role_bindings,
                    teams,
                    config.auth.default_role,
                )),
            ),
            StorageBackend::Postgres => {
                let database_url = config.storage.database_url.as_deref().ok_or_else(|| {
                    AppError::Fatal("storage.databaseUrl is required with postgres storage".to_owned())
                })?;
                let pool = connect_and_migrate(database_url).await?;
                let registry =
                    PostgresRoleRegistry::new(pool.clone(), teams, config.auth.default_role);
                let mut seeded = role_bindings.into_iter().collect::<Vec<_>>();
                seeded.sort_by(|left, right| left.0.as_str().cmp(right.0.as_str()));
                registry.seed(&seeded).await?;

                (
                    Arc::new(PostgresAccessRequestRepository::new(pool.clone())),
                    Arc::new(PostgresAccessJobRepository::new(pool.clone())),
                    Arc::new(PostgresClusterRepository::new(pool.clone())),
                    Arc::new(PostgresSecretStore::new(pool, cipher)),
                    Arc::new(registry),
                )
            }
        };

        let (minter, binder): (Arc<dyn SessionMinter>, Arc<dyn ClusterAccessBinder>) =
            match config.aws.provider {
                CloudProvider::Aws => {
                    let sdk_config = load_aws_config(config.aws.region.as_str()).await;
                    (
                        Arc::new(AwsSessionMinter::new(&sdk_config)),
                        Arc::new(AwsEksAccessBinder::new(sdk_config)),
                    )
                }
                CloudProvider::Simulated => {
                    let cloud = Arc::new(SimulatedCloud::new(clock.clone()));
                    (cloud.clone(), cloud)
                }
            };

        let chat: Arc<dyn ChatGateway> = match config.slack.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {
                let http_client = reqwest::Client::builder()
                    .timeout(CHAT_HTTP_TIMEOUT)
                    .build()
                    .map_err(|error| {
                        AppError::Fatal(format!("failed to build HTTP client: {error}"))
                    })?;
                Arc::new(SlackChatGateway::new(
                    http_client,
                    config.slack.api_base_url.clone(),
                    token.to_owned(),
                ))
            }
            _ => Arc::new(ConsoleChatGateway::new()),
        };

        let leases = match config.redis.url.as_deref() {
            Some(url) => Some(Arc::new(RedisReconcileLeaseCoordinator::from_url(
                url,
                LEASE_KEY_PREFIX,
            )?) as Arc<dyn ReconcileLeaseCoordinator>),
            None => None,
        };

        let stack = Self {
            config: config.clone(),
            requests,
            jobs,
            clusters,
            secrets,
            roles,
            minter,
            binder,
            chat,
            clock,
            leases,
        };
        stack.seed_clusters().await?;

        info!(
            storage = ?config.storage.backend,
            provider = ?config.aws.provider,
            leases = stack.leases.is_some(),
            "access stack ready"
        );
        Ok(stack)
    }

    // Seed entries never overwrite clusters registered at runtime.
    async fn seed_clusters(&self) -> AppResult<()> {
        for input in &self.config.clusters {
            let cluster = Cluster::new(Uuid::new_v4().to_string(), input.clone())?;
            if self.clusters.find_by_name(cluster.name()).await?.is_some() {
                continue;
            }
            self.clusters.save(cluster.clone()).await?;
            info!(cluster = %cluster.name(), "seeded cluster");
        }
        Ok(())
    }

    /// Returns operator authorization over the role registry.
    #[must_use]
    pub fn authorization(&self) -> AuthorizationService {
        AuthorizationService::new(self.roles.clone())
    }

    /// Builds the reconcile controller with leases attached when configured.
    #[must_use]
    pub fn controller(&self, holder_id: impl Into<String>) -> Controller {
        let executor = GrantExecutor::new(
            self.minter.clone(),
            self.binder.clone(),
            self.secrets.clone(),
            self.clock.clone(),
            self.config.access.max_duration,
        );
        let reconciler = Reconciler::new(
            self.requests.clone(),
            self.jobs.clone(),
            self.clusters.clone(),
            self.roles.clone(),
            executor,
            self.chat.clone(),
            self.clock.clone(),
            self.config.reconciler_settings(),
        );

        let controller = Controller::new(
            reconciler,
            self.config.worker.controller_settings(holder_id),
        );
        match &self.leases {
            Some(leases) => controller.with_leases(leases.clone()),
            None => controller,
        }
    }

    /// Builds the expiry sweeper.
    #[must_use]
    pub fn sweeper(&self, trigger: Arc<dyn ReconcileTrigger>) -> ExpirySweeper {
        ExpirySweeper::new(
            self.requests.clone(),
            self.jobs.clone(),
            self.clusters.clone(),
            self.binder.clone(),
            trigger,
            self.clock.clone(),
        )
    }

    /// Builds the access request use-cases.
    pub fn access_request_service(
        &self,
        trigger: Arc<dyn ReconcileTrigger>,
    ) -> AppResult<AccessRequestService> {
        Ok(AccessRequestService::new(
            AccessRequestServiceDeps {
                requests: self.requests.clone(),
                jobs: self.jobs.clone(),
                clusters: self.clusters.clone(),
                secrets: self.secrets.clone(),
                chat: self.chat.clone(),
                trigger: trigger.clone(),
                clock: self.clock.clone(),
                authorization: self.authorization(),
                sweeper: self.sweeper(trigger),
            },
            self.config.request_policy()?,
            self.config.slack.email_domain.clone(),
        ))
    }

    /// Builds the cluster registry use-cases.
    #[must_use]
    pub fn cluster_service(&self, trigger: Arc<dyn ReconcileTrigger>) -> ClusterService {
        ClusterService::new(
            self.clusters.clone(),
            self.requests.clone(),
            trigger,
            self.authorization(),
        )
    }
}
