//! Application services and ports.

#![forbid(unsafe_code)]

mod access_ports;
mod access_request_service;
mod authorization_service;
mod cluster_service;
mod controller;
mod expiry_sweeper;
mod grant_executor;
mod kubeconfig;
mod reconcile_context;
mod reconciler;
mod request_policy;
mod retry;
mod work_queue;

#[cfg(test)]
mod test_support;

pub use access_ports::{
    AccessBinding, AccessJobRepository, AccessRequestQuery, AccessRequestRepository, ChatGateway,
    Clock, ClusterAccessBinder, ClusterDescription, ClusterRepository, ManualClock,
    MintSessionInput, NoopReconcileTrigger, ReconcileKey, ReconcileLease,
    ReconcileLeaseCoordinator, ReconcileTrigger, RoleRegistry, SecretStore, SessionCredentials,
    SessionMinter, SystemClock, TeamDirectory,
};
pub use access_request_service::{
    AccessListFilter, AccessRequestService, AccessRequestServiceDeps, CreateAccessRequestInput,
};
pub use authorization_service::AuthorizationService;
pub use cluster_service::ClusterService;
pub use controller::{Controller, ControllerSettings, QueueTrigger};
pub use expiry_sweeper::{ExpirySweeper, SweepReport};
pub use grant_executor::{
    GrantExecutor, access_username, credentials_secret_key, inline_session_policy,
    kubeconfig_secret_key, principal_arn, session_ttl,
};
pub use kubeconfig::render_kubeconfig;
pub use reconcile_context::{DEFAULT_EXTERNAL_CALL_TIMEOUT, ReconcileContext};
pub use reconciler::{ReconcileAction, Reconciler, ReconcilerSettings};
pub use request_policy::{
    AccessRequestDraft, BANNED_JUSTIFICATION_PHRASES, RequestPolicy, default_approvers,
    is_auto_approvable,
};
pub use retry::Backoff;
pub use work_queue::WorkQueue;
