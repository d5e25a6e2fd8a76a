use std::sync::Arc;

use jit_application::{
    AccessRequestService, AuthorizationService, Clock, ClusterRepository, ClusterService,
    ReconcileTrigger,
};
use jit_core::AppResult;
use jit_infrastructure::AccessStack;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub access_request_service: AccessRequestService,
    pub cluster_service: ClusterService,
    pub authorization_service: AuthorizationService,
    pub cluster_repository: Arc<dyn ClusterRepository>,
    pub clock: Arc<dyn Clock>,
    pub signing_secret: Arc<str>,
}

impl AppState {
    pub fn build(
        stack: &AccessStack,
        trigger: Arc<dyn ReconcileTrigger>,
        signing_secret: &str,
    ) -> AppResult<Self> {
        Ok(Self {
            access_request_service: stack.access_request_service(trigger.clone())?,
            cluster_service: stack.cluster_service(trigger),
            authorization_service: stack.authorization(),
            cluster_repository: stack.clusters.clone(),
            clock: stack.clock.clone(),
            signing_secret: Arc::from(signing_secret),
        })
    }
}
