use std::collections::HashMap;

use async_trait::async_trait;
use jit_application::{AccessRequestQuery, AccessRequestRepository};
use jit_core::{AppError, AppResult};
use jit_domain::AccessRequest;
use tokio::sync::RwLock;

/// In-memory access request store with versioned writes.
#[derive(Debug, Default)]
pub struct InMemoryAccessRequestRepository {
    requests: RwLock<HashMap<String, AccessRequest>>,
}

impl InMemoryAccessRequestRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessRequestRepository for InMemoryAccessRequestRepository {
    async fn create(&self, request: AccessRequest) -> AppResult<AccessRequest> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(request.id()) {
            return Err(AppError::Conflict(format!(
                "access request '{}' already exists",
                request.id()
            )));
        }

        let stored = request.with_resource_version(1);
        requests.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: &str) -> AppResult<Option<AccessRequest>> {
        Ok(self.requests.read().await.get(id).cloned())
    }

    async fn update(&self, request: AccessRequest) -> AppResult<AccessRequest> {
        let mut requests = self.requests.write().await;
        let current = requests
            .get(request.id())
            .ok_or_else(|| AppError::NotFound(format!("access request '{}'", request.id())))?;
        if current.resource_version() != request.resource_version() {
            return Err(AppError::Conflict(format!(
                "access request '{}' was modified concurrently (version {} != {})",
                request.id(),
                request.resource_version(),
                current.resource_version()
            )));
        }

        let next_version = current.resource_version() + 1;
        let stored = request.with_resource_version(next_version);
        requests.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.requests.write().await.remove(id).is_some())
    }

    async fn list(&self, query: &AccessRequestQuery) -> AppResult<Vec<AccessRequest>> {
        let requests = self.requests.read().await;
        let mut values = requests
            .values()
            .filter(|request| query.matches(request))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|left, right| right.created_at().cmp(&left.created_at()));
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use jit_domain::RequestPhase;

    use super::*;
    use crate::test_fixtures::request;

    #[tokio::test]
    async fn stale_update_conflicts() {
        let repository = InMemoryAccessRequestRepository::new();
        let stored = repository
            .create(request("req-1", "U0000000001", 0))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(stored.resource_version(), 1);

        let mut first = stored.clone();
        let _ = first.approve("AutoApproved", "view on dev", first.created_at());
        let updated = repository.update(first).await;
        assert_eq!(updated.map(|request| request.resource_version()).ok(), Some(2));

        let mut stale = stored;
        let _ = stale.deny("DeniedByApprover", "late", stale.created_at());
        let result = repository.update(stale).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let current = repository.find("req-1").await.unwrap_or_default();
        assert_eq!(current.map(|request| request.phase()), Some(RequestPhase::Approved));
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let repository = InMemoryAccessRequestRepository::new();
        let _ = repository.create(request("req-old", "U0000000001", 0)).await;
        let _ = repository.create(request("req-new", "U0000000001", 5)).await;

        let listed = repository
            .list(&AccessRequestQuery::default())
            .await
            .unwrap_or_default();
        assert_eq!(
            listed.iter().map(AccessRequest::id).collect::<Vec<_>>(),
            ["req-new", "req-old"]
        );
    }
}
