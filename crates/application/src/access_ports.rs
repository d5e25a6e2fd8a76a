mod chat;
mod clock;
mod cloud;
mod lease;
mod repository;
mod secrets;
mod trigger;

pub use chat::ChatGateway;
pub use clock::{Clock, ManualClock, SystemClock};
pub use cloud::{
    AccessBinding, ClusterAccessBinder, ClusterDescription, MintSessionInput, SessionCredentials,
    SessionMinter,
};
pub use lease::{ReconcileLease, ReconcileLeaseCoordinator};
pub use repository::{
    AccessJobRepository, AccessRequestQuery, AccessRequestRepository, ClusterRepository,
    RoleRegistry, TeamDirectory,
};
pub use secrets::SecretStore;
pub use trigger::{NoopReconcileTrigger, ReconcileKey, ReconcileTrigger};
