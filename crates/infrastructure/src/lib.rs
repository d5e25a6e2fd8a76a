//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod access_stack;
mod aes_secret_cipher;
mod aws_eks_access_binder;
mod aws_errors;
mod aws_sdk_config;
mod aws_session_minter;
/// Runtime configuration loading and validation.
pub mod config;
mod console_chat_gateway;
mod in_memory_access_job_repository;
mod in_memory_access_request_repository;
mod in_memory_cluster_repository;
mod in_memory_role_registry;
mod in_memory_secret_store;
mod postgres_access_job_repository;
mod postgres_access_request_repository;
mod postgres_cluster_repository;
mod postgres_errors;
mod postgres_role_registry;
mod postgres_secret_store;
mod redis_reconcile_lease_coordinator;
mod simulated_cloud;
mod slack_chat_gateway;

#[cfg(test)]
mod test_fixtures;

pub use access_stack::{AccessStack, connect_and_migrate};
pub use aes_secret_cipher::AesSecretCipher;
pub use aws_eks_access_binder::AwsEksAccessBinder;
pub use aws_sdk_config::load_aws_config;
pub use aws_session_minter::AwsSessionMinter;
pub use config::JitConfig;
pub use console_chat_gateway::ConsoleChatGateway;
pub use in_memory_access_job_repository::InMemoryAccessJobRepository;
pub use in_memory_access_request_repository::InMemoryAccessRequestRepository;
pub use in_memory_cluster_repository::InMemoryClusterRepository;
pub use in_memory_role_registry::InMemoryRoleRegistry;
pub use in_memory_secret_store::InMemorySecretStore;
pub use postgres_access_job_repository::PostgresAccessJobRepository;
pub use postgres_access_request_repository::PostgresAccessRequestRepository;
pub use postgres_cluster_repository::PostgresClusterRepository;
pub use postgres_role_registry::PostgresRoleRegistry;
pub use postgres_secret_store::PostgresSecretStore;
pub use redis_reconcile_lease_coordinator::RedisReconcileLeaseCoordinator;
pub use simulated_cloud::SimulatedCloud;
pub use slack_chat_gateway::{DEFAULT_SLACK_API_BASE_URL, SlackChatGateway};
