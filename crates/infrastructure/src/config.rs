//! Runtime configuration shared by the API and worker binaries.
//!
//! Values come from built-in defaults, then an optional YAML file, then
//! `JIT_<PATH>` environment variables (path segments upper-cased, joined by
//! `_`, lists comma separated).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use jit_application::{ControllerSettings, ReconcilerSettings, RequestPolicy};
use jit_core::{AppError, AppResult};
use jit_domain::{
    AccessDuration, AccountId, CleanupPolicy, ClusterInput, OperatorRole, TeamName, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aes_secret_cipher::AesSecretCipher;
use crate::slack_chat_gateway::DEFAULT_SLACK_API_BASE_URL;

const ENV_PREFIX: &str = "JIT_";
const CONFIG_PATH_VAR: &str = "JIT_CONFIG";

/// Durable role assumed when the simulated cloud is used without `aws.roleArn`.
pub const SIMULATED_ROLE_ARN: &str = "arn:aws:iam::000000000000:role/jit-access";

/// Binary validating the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTarget {
    /// HTTP API and chat webhook.
    Api,
    /// Dedicated reconcile worker.
    Worker,
}

/// Backing store for requests, jobs, clusters, secrets and roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps.
    #[default]
    Memory,
    /// PostgreSQL through sqlx.
    Postgres,
}

/// Cloud API implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// AWS STS and EKS.
    #[default]
    Aws,
    /// In-process simulation for local development.
    Simulated,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Where reconciliation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Inside the API process.
    #[default]
    Embedded,
    /// In the separate worker binary.
    Dedicated,
}

/// `server.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request body read budget.
    pub read_timeout: AccessDuration,
    /// Handler budget.
    pub write_timeout: AccessDuration,
    /// Keep-alive idle budget.
    pub idle_timeout: AccessDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            read_timeout: AccessDuration::from_seconds(30),
            write_timeout: AccessDuration::from_seconds(30),
            idle_timeout: AccessDuration::from_seconds(120),
        }
    }
}

/// `slack.*` keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackConfig {
    /// Bot token; messages are logged instead of sent when unset.
    pub token: Option<String>,
    /// Request signing secret for the command webhook.
    pub signing_secret: Option<String>,
    /// Web API base URL.
    pub api_base_url: String,
    /// Domain for emails derived from user ids when the profile has none.
    pub email_domain: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            signing_secret: None,
            api_base_url: DEFAULT_SLACK_API_BASE_URL.to_owned(),
            email_domain: "example.com".to_owned(),
        }
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SlackConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("email_domain", &self.email_domain)
            .finish()
    }
}

/// `aws.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsConfig {
    /// Home region for STS.
    pub region: String,
    /// Accounts clusters may live in; empty allows any.
    pub account_ids: Vec<String>,
    /// SAML provider federating operators into the account.
    pub saml_provider_arn: Option<String>,
    /// Required prefix of managed cluster names.
    pub eks_cluster_prefix: Option<String>,
    /// Durable role the minter assumes.
    pub role_arn: Option<String>,
    /// Cloud implementation.
    pub provider: CloudProvider,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_owned(),
            account_ids: Vec::new(),
            saml_provider_arn: None,
            eks_cluster_prefix: None,
            role_arn: None,
            provider: CloudProvider::Aws,
        }
    }
}

/// `access.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfig {
    /// Upper bound on any grant.
    pub max_duration: AccessDuration,
    /// Window used when a request names none.
    pub default_duration: AccessDuration,
    /// Whether requests outside the auto-approve rule need an approval.
    pub approval_required: bool,
    /// Job record retention after completion.
    pub cleanup_policy: CleanupPolicy,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_duration: AccessDuration::MAX,
            default_duration: AccessDuration::DEFAULT,
            approval_required: true,
            cleanup_policy: CleanupPolicy::OnDelete,
        }
    }
}

/// `log.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

/// `auth.*` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// Users bound to the admin role at startup.
    pub admin_users: Vec<String>,
    /// Users bound to the approver role at startup.
    pub approvers: Vec<String>,
    /// Team name to member user ids.
    pub teams: BTreeMap<String, Vec<String>>,
    /// Role of users without a binding.
    pub default_role: OperatorRole,
}

/// `storage.*` keys.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Store implementation.
    pub backend: StorageBackend,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Hex encoded 32-byte key sealing secrets at rest.
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// `redis.*` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisConfig {
    /// Enables cross-replica reconcile leases when set.
    pub url: Option<String>,
}

/// `worker.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    /// Where reconciliation runs.
    pub mode: WorkerMode,
    /// Concurrent reconcile workers.
    pub concurrency: usize,
    /// Budget of one reconcile run.
    pub reconcile_timeout: AccessDuration,
    /// Bound on each external call.
    pub external_call_timeout: AccessDuration,
    /// Full resync cadence.
    pub resync_interval: AccessDuration,
    /// Expiry sweep cadence.
    pub sweep_interval: AccessDuration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Embedded,
            concurrency: 4,
            reconcile_timeout: AccessDuration::from_seconds(60),
            external_call_timeout: AccessDuration::from_seconds(30),
            resync_interval: AccessDuration::from_seconds(300),
            sweep_interval: AccessDuration::from_seconds(60),
        }
    }
}

impl WorkerConfig {
    /// Returns controller settings for one replica.
    #[must_use]
    pub fn controller_settings(&self, holder_id: impl Into<String>) -> ControllerSettings {
        ControllerSettings {
            concurrency: self.concurrency.max(1),
            reconcile_timeout: std_duration(self.reconcile_timeout),
            external_call_timeout: std_duration(self.external_call_timeout),
            resync_interval: std_duration(self.resync_interval),
            holder_id: holder_id.into(),
            ..ControllerSettings::default()
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JitConfig {
    /// HTTP server.
    pub server: ServerConfig,
    /// Chat integration.
    pub slack: SlackConfig,
    /// Cloud integration.
    pub aws: AwsConfig,
    /// Request policy.
    pub access: AccessConfig,
    /// Logging.
    pub log: LogConfig,
    /// Operator roles and teams.
    pub auth: AuthConfig,
    /// Persistence.
    pub storage: StorageConfig,
    /// Cross-replica coordination.
    pub redis: RedisConfig,
    /// Reconcile runtime.
    pub worker: WorkerConfig,
    /// Clusters registered at startup when absent.
    pub clusters: Vec<ClusterInput>,
}

/// Converts a configured duration into a runtime duration.
#[must_use]
pub fn std_duration(duration: AccessDuration) -> Duration {
    Duration::from_secs(duration.as_seconds())
}

/// Picks the config file from `--config <path>` or `JIT_CONFIG`.
#[must_use]
pub fn resolve_config_path(args: &[String], vars: &HashMap<String, String>) -> Option<PathBuf> {
    args.windows(2)
        .find(|pair| pair[0] == "--config")
        .map(|pair| PathBuf::from(pair[1].as_str()))
        .or_else(|| {
            vars.get(CONFIG_PATH_VAR)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        })
}

fn fatal(error: impl std::fmt::Display) -> AppError {
    AppError::Fatal(format!("invalid configuration: {error}"))
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key.as_str()) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn coerce(existing: &Value, raw: &str, name: &str) -> AppResult<Value> {
    match existing {
        Value::Bool(_) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(fatal(format!("{name} must be a boolean, got '{raw}'"))),
        },
        Value::Number(_) => raw
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|error| fatal(format!("{name} must be a number: {error}"))),
        Value::Array(_) => Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_owned()))
                .collect(),
        )),
        _ => Ok(Value::String(raw.to_owned())),
    }
}

/// Applies one `JIT_*` override; returns whether a key matched.
fn apply_override(root: &mut Value, name: &str, raw: &str) -> AppResult<bool> {
    let Some(path) = name.strip_prefix(ENV_PREFIX) else {
        return Ok(false);
    };

    let mut current = root;
    for segment in path.split('_') {
        let Value::Object(map) = current else {
            return Ok(false);
        };
        let Some(key) = map
            .keys()
            .find(|key| key.eq_ignore_ascii_case(segment))
            .cloned()
        else {
            return Ok(false);
        };
        let Some(next) = map.get_mut(key.as_str()) else {
            return Ok(false);
        };
        current = next;
    }

    if matches!(current, Value::Object(_)) {
        return Ok(false);
    }
    *current = coerce(current, raw, name)?;
    Ok(true)
}

fn parse_users(values: &[String], key: &str) -> AppResult<Vec<UserId>> {
    values
        .iter()
        .map(|value| UserId::new(value.trim()).map_err(|error| fatal(format!("{key}: {error}"))))
        .collect()
}

impl JitConfig {
    /// Loads defaults, then the YAML file at `path`, then `JIT_*` overrides.
    pub fn load(
        path: Option<&Path>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> AppResult<Self> {
        let file = match path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|error| {
                AppError::Fatal(format!(
                    "failed to read config file '{}': {error}",
                    path.display()
                ))
            })?),
            None => None,
        };

        Self::from_sources(file.as_deref(), vars)
    }

    /// Builds the configuration from YAML text and environment pairs.
    pub fn from_sources(
        yaml: Option<&str>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> AppResult<Self> {
        let mut merged = serde_json::to_value(Self::default()).map_err(fatal)?;

        if let Some(yaml) = yaml {
            let file: Value = serde_yaml::from_str(yaml).map_err(fatal)?;
            if !file.is_null() {
                merge(&mut merged, file);
            }
        }

        let mut vars = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with(ENV_PREFIX) && name != CONFIG_PATH_VAR)
            .collect::<Vec<_>>();
        vars.sort();
        for (name, value) in vars {
            apply_override(&mut merged, name.as_str(), value.as_str())?;
        }

        serde_json::from_value(merged).map_err(fatal)
    }

    /// Checks the configuration for the given binary.
    pub fn validate(&self, target: ConfigTarget) -> AppResult<()> {
        if target == ConfigTarget::Api
            && self
                .slack
                .signing_secret
                .as_deref()
                .is_none_or(|secret| secret.trim().is_empty())
        {
            return Err(fatal("slack.signingSecret is required"));
        }

        match self.storage.backend {
            StorageBackend::Postgres => {
                if self
                    .storage
                    .database_url
                    .as_deref()
                    .is_none_or(|url| url.trim().is_empty())
                {
                    return Err(fatal("storage.databaseUrl is required with postgres storage"));
                }
                if self.storage.encryption_key.is_none() {
                    return Err(fatal(
                        "storage.encryptionKey is required with postgres storage",
                    ));
                }
            }
            StorageBackend::Memory => {
                if target == ConfigTarget::Worker || self.worker.mode == WorkerMode::Dedicated {
                    return Err(fatal(
                        "a dedicated worker requires storage.backend = postgres",
                    ));
                }
            }
        }
        self.secret_cipher()?;

        if self.aws.provider == CloudProvider::Aws && self.aws.role_arn.is_none() {
            return Err(fatal("aws.roleArn is required with the aws provider"));
        }
        if let Some(arn) = self.aws.saml_provider_arn.as_deref()
            && !(arn.starts_with("arn:aws:iam::") && arn.contains(":saml-provider/"))
        {
            return Err(fatal(format!(
                "aws.samlProviderArn '{arn}' is not a SAML provider ARN"
            )));
        }

        self.request_policy()?;
        if self.worker.concurrency == 0 {
            return Err(fatal("worker.concurrency must be at least 1"));
        }

        self.role_bindings()?;
        self.team_directory()?;
        self.validate_clusters()
    }

    fn validate_clusters(&self) -> AppResult<()> {
        let accounts = self
            .aws
            .account_ids
            .iter()
            .map(|account| AccountId::new(account.trim()).map_err(fatal))
            .collect::<AppResult<Vec<_>>>()?;

        for cluster in &self.clusters {
            let listed = accounts
                .iter()
                .any(|account| account.as_str() == cluster.account.trim());
            if !accounts.is_empty() && !listed {
                return Err(fatal(format!(
                    "cluster '{}' is in account {} which is not listed in aws.accountIds",
                    cluster.name, cluster.account
                )));
            }
            if let Some(prefix) = self.aws.eks_cluster_prefix.as_deref()
                && !cluster.name.starts_with(prefix)
            {
                return Err(fatal(format!(
                    "cluster '{}' does not start with aws.eksClusterPrefix '{prefix}'",
                    cluster.name
                )));
            }
        }

        Ok(())
    }

    /// Returns the cipher sealing secrets, or `None` when no key is configured.
    pub fn secret_cipher(&self) -> AppResult<Option<AesSecretCipher>> {
        self.storage
            .encryption_key
            .as_deref()
            .map(AesSecretCipher::from_hex)
            .transpose()
    }

    /// Returns the request policy bounds.
    pub fn request_policy(&self) -> AppResult<RequestPolicy> {
        RequestPolicy::new(self.access.max_duration, self.access.default_duration)
            .map_err(|error| fatal(format!("access durations: {error}")))
    }

    /// Returns reconciler settings derived from `aws` and `access`.
    #[must_use]
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        let role_identity = self
            .aws
            .role_arn
            .clone()
            .unwrap_or_else(|| SIMULATED_ROLE_ARN.to_owned());

        ReconcilerSettings {
            cleanup_policy: self.access.cleanup_policy,
            approval_required: self.access.approval_required,
            ..ReconcilerSettings::new(role_identity)
        }
    }

    /// Returns startup role bindings; admin wins over approver.
    pub fn role_bindings(&self) -> AppResult<HashMap<UserId, OperatorRole>> {
        let mut roles = HashMap::new();
        for user_id in parse_users(&self.auth.approvers, "auth.approvers")? {
            roles.insert(user_id, OperatorRole::Approver);
        }
        for user_id in parse_users(&self.auth.admin_users, "auth.adminUsers")? {
            roles.insert(user_id, OperatorRole::Admin);
        }
        Ok(roles)
    }

    /// Returns team membership.
    pub fn team_directory(&self) -> AppResult<BTreeMap<TeamName, BTreeSet<UserId>>> {
        self.auth
            .teams
            .iter()
            .map(|(team, members)| {
                let team = TeamName::new(team.as_str()).map_err(fatal)?;
                let members = parse_users(members, "auth.teams")?;
                Ok((team, members.into_iter().collect()))
            })
            .collect()
    }
}
