use std::collections::HashMap;

use async_trait::async_trait;
use jit_application::AccessJobRepository;
use jit_core::{AppError, AppResult};
use jit_domain::AccessJob;
use tokio::sync::RwLock;

/// In-memory access job store; one job per owning request.
#[derive(Debug, Default)]
pub struct InMemoryAccessJobRepository {
    jobs: RwLock<HashMap<String, AccessJob>>,
}

impl InMemoryAccessJobRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn ensure_session_name_free(jobs: &HashMap<String, AccessJob>, job: &AccessJob) -> AppResult<()> {
    let Some(session_name) = job.session_name() else {
        return Ok(());
    };
    if jobs
        .values()
        .any(|stored| stored.id() != job.id() && stored.session_name() == Some(session_name))
    {
        return Err(AppError::Conflict(format!(
            "session name '{session_name}' is held by another job"
        )));
    }
    Ok(())
}

#[async_trait]
impl AccessJobRepository for InMemoryAccessJobRepository {
    async fn create(&self, job: AccessJob) -> AppResult<AccessJob> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id()) {
            return Err(AppError::Conflict(format!("job '{}' already exists", job.id())));
        }
        if jobs
            .values()
            .any(|stored| stored.request_ref() == job.request_ref())
        {
            return Err(AppError::Conflict(format!(
                "access request '{}' already owns a job",
                job.request_ref()
            )));
        }
        ensure_session_name_free(&jobs, &job)?;

        let stored = job.with_resource_version(1);
        jobs.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: &str) -> AppResult<Option<AccessJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn find_by_request(&self, request_id: &str) -> AppResult<Option<AccessJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|job| job.request_ref() == request_id)
            .cloned())
    }

    async fn find_by_session_name(&self, session_name: &str) -> AppResult<Option<AccessJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|job| {
                job.session_name()
                    .is_some_and(|name| name.as_str() == session_name)
            })
            .cloned())
    }

    async fn update(&self, job: AccessJob) -> AppResult<AccessJob> {
        let mut jobs = self.jobs.write().await;
        let current = jobs
            .get(job.id())
            .ok_or_else(|| AppError::NotFound(format!("job '{}'", job.id())))?;
        if current.resource_version() != job.resource_version() {
            return Err(AppError::Conflict(format!(
                "job '{}' was modified concurrently (version {} != {})",
                job.id(),
                job.resource_version(),
                current.resource_version()
            )));
        }
        ensure_session_name_free(&jobs, &job)?;

        let next_version = current.resource_version() + 1;
        let stored = job.with_resource_version(next_version);
        jobs.insert(stored.id().to_owned(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }

    async fn list(&self) -> AppResult<Vec<AccessJob>> {
        let mut jobs = self
            .jobs
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        jobs.sort_by(|left, right| left.created_at().cmp(&right.created_at()));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{creating_job, request};

    #[tokio::test]
    async fn one_job_per_request_and_session_lookup() {
        let repository = InMemoryAccessJobRepository::new();
        let parent = request("req-1", "U0000000001", 0);
        let job = creating_job("job-1", &parent);
        let session_name = job
            .session_name()
            .map(|name| name.as_str().to_owned())
            .unwrap_or_default();

        assert!(repository.create(job).await.is_ok());
        let second = repository.create(creating_job("job-2", &parent)).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));

        let by_session = repository
            .find_by_session_name(session_name.as_str())
            .await
            .unwrap_or_default();
        assert_eq!(by_session.map(|job| job.id().to_owned()), Some("job-1".to_owned()));
        let by_request = repository.find_by_request("req-1").await.unwrap_or_default();
        assert!(by_request.is_some());
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_copies() {
        let repository = InMemoryAccessJobRepository::new();
        let parent = request("req-1", "U0000000001", 0);
        let stored = repository
            .create(creating_job("job-1", &parent))
            .await
            .unwrap_or_else(|_| unreachable!());

        let mut failing = stored.clone();
        let _ = failing.fail("GrantFailed", "denied", stored.created_at());
        let updated = repository.update(failing).await;
        assert_eq!(updated.map(|job| job.resource_version()).ok(), Some(2));

        let stale = repository.update(stored).await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn session_names_are_unique_across_jobs() {
        let repository = InMemoryAccessJobRepository::new();
        let first = request("req-1", "U0000000001", 0);
        let second = request("req-2", "U0000000001", 0);
        assert!(repository.create(creating_job("job-1", &first)).await.is_ok());

        let clash = repository.create(creating_job("job-2", &second)).await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));
    }
}
