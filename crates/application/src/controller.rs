//! Reconcile controller: a worker pool over the keyed work queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jit_core::AppError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::access_ports::{ReconcileKey, ReconcileLeaseCoordinator, ReconcileTrigger};
use crate::reconcile_context::{DEFAULT_EXTERNAL_CALL_TIMEOUT, ReconcileContext};
use crate::reconciler::{ReconcileAction, Reconciler};
use crate::retry::Backoff;
use crate::work_queue::WorkQueue;

const LEASE_CONTENDED_RETRY: Duration = Duration::from_secs(5);

/// Runtime settings of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Budget of one reconcile run.
    pub reconcile_timeout: Duration,
    /// Bound on each external call inside a run.
    pub external_call_timeout: Duration,
    /// Interval between full resyncs.
    pub resync_interval: Duration,
    /// Identifier of this replica in lease records.
    pub holder_id: String,
    /// Lease time-to-live.
    pub lease_seconds: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            reconcile_timeout: Duration::from_secs(60),
            external_call_timeout: DEFAULT_EXTERNAL_CALL_TIMEOUT,
            resync_interval: Duration::from_secs(300),
            holder_id: "jit-controller".to_owned(),
            lease_seconds: 90,
        }
    }
}

/// Reconcile trigger feeding the controller queue.
#[derive(Clone)]
pub struct QueueTrigger {
    queue: Arc<WorkQueue<ReconcileKey>>,
}

#[async_trait]
impl ReconcileTrigger for QueueTrigger {
    async fn enqueue(&self, key: ReconcileKey) {
        self.queue.add(key);
    }
}

/// Worker pool driving the reconciler.
#[derive(Clone)]
pub struct Controller {
    reconciler: Reconciler,
    queue: Arc<WorkQueue<ReconcileKey>>,
    failures: Arc<Mutex<HashMap<ReconcileKey, u32>>>,
    backoff: Backoff,
    leases: Option<Arc<dyn ReconcileLeaseCoordinator>>,
    settings: ControllerSettings,
}

impl Controller {
    /// Creates a controller without cross-replica leases.
    #[must_use]
    pub fn new(reconciler: Reconciler, settings: ControllerSettings) -> Self {
        Self {
            reconciler,
            queue: Arc::new(WorkQueue::new()),
            failures: Arc::new(Mutex::new(HashMap::new())),
            backoff: Backoff::default(),
            leases: None,
            settings,
        }
    }

    /// Serializes each key across replicas through `coordinator`.
    #[must_use]
    pub fn with_leases(mut self, coordinator: Arc<dyn ReconcileLeaseCoordinator>) -> Self {
        self.leases = Some(coordinator);
        self
    }

    /// Returns a trigger enqueueing into this controller.
    #[must_use]
    pub fn trigger(&self) -> QueueTrigger {
        QueueTrigger {
            queue: self.queue.clone(),
        }
    }

    /// Runs workers and the resync loop until `shutdown` fires, then waits
    /// for in-flight reconciles.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut workers = JoinSet::new();
        for worker in 0..self.settings.concurrency.max(1) {
            let controller = self.clone();
            workers.spawn(async move { controller.work(worker).await });
        }
        info!(
            concurrency = self.settings.concurrency,
            resync_interval_secs = self.settings.resync_interval.as_secs(),
            "reconcile controller started"
        );

        let mut resync = tokio::time::interval(self.settings.resync_interval);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = resync.tick() => self.resync().await,
            }
        }

        self.queue.shutdown();
        while workers.join_next().await.is_some() {}
        info!("reconcile controller drained");
    }

    async fn resync(&self) {
        match self.reconciler.resync_keys().await {
            Ok(keys) => {
                debug!(count = keys.len(), "resync");
                for key in keys {
                    self.queue.add(key);
                }
            }
            Err(error) => warn!(error = %error, "resync listing failed"),
        }
    }

    async fn work(&self, worker: usize) {
        while let Some(key) = self.queue.next().await {
            self.process(&key).await;
            self.queue.done(&key);
        }
        debug!(worker, "worker stopped");
    }

    async fn process(&self, key: &ReconcileKey) {
        let lease = match &self.leases {
            Some(coordinator) => {
                match coordinator
                    .try_acquire(
                        key.to_string().as_str(),
                        self.settings.holder_id.as_str(),
                        self.settings.lease_seconds,
                    )
                    .await
                {
                    Ok(Some(lease)) => Some((coordinator, lease)),
                    Ok(None) => {
                        debug!(key = %key, "key leased by another replica");
                        self.queue.add_after(key.clone(), LEASE_CONTENDED_RETRY);
                        return;
                    }
                    Err(error) => {
                        self.retry(key, &error);
                        return;
                    }
                }
            }
            None => None,
        };

        let context = ReconcileContext::new(
            self.settings.reconcile_timeout,
            self.settings.external_call_timeout,
            CancellationToken::new(),
        );
        let result = self.reconciler.reconcile(key, &context).await;

        if let Some((coordinator, lease)) = lease
            && let Err(error) = coordinator.release(&lease).await
        {
            warn!(key = %key, error = %error, "failed to release reconcile lease");
        }

        match result {
            Ok(action) => self.schedule(key, &action),
            Err(error @ (AppError::Transient(_) | AppError::Conflict(_))) => {
                self.retry(key, &error);
            }
            Err(error) => {
                self.forget(key);
                error!(key = %key, error = %error, reason = error.reason(), "reconcile failed");
            }
        }
    }

    fn schedule(&self, key: &ReconcileKey, action: &ReconcileAction) {
        self.forget(key);
        for follow_up in action.follow_ups() {
            self.queue.add(follow_up.clone());
        }
        if let Some(delay) = action.requeue_after() {
            self.queue.add_after(key.clone(), delay);
        }
    }

    fn retry(&self, key: &ReconcileKey, error: &AppError) {
        let failures = {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            let count = failures.entry(key.clone()).or_insert(0);
            let previous = *count;
            *count = count.saturating_add(1);
            previous
        };
        let delay = self.backoff.jittered_delay(failures);
        warn!(
            key = %key,
            error = %error,
            attempt = failures + 1,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconcile will retry"
        );
        self.queue.add_after(key.clone(), delay);
    }

    fn forget(&self, key: &ReconcileKey) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use jit_core::AppResult;
    use jit_domain::{AccessDuration, AccessRequest, Environment, RequestPhase};
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::access_ports::{AccessRequestRepository, ManualClock, ReconcileLease};
    use crate::grant_executor::GrantExecutor;
    use crate::reconciler::ReconcilerSettings;
    use crate::request_policy::{AccessRequestDraft, RequestPolicy};
    use crate::test_support::{
        FakeChatGateway, FakeClusterBinder, FakeClusterRepository, FakeJobRepository,
        FakeRequestRepository, FakeRoleRegistry, FakeSecretStore, FakeSessionMinter, cluster, now,
    };

    struct Fixture {
        requests: Arc<FakeRequestRepository>,
        minter: Arc<FakeSessionMinter>,
        controller: Controller,
    }

    async fn fixture() -> Fixture {
        let target = cluster("dev-east-1", Environment::Development);
        let clock = Arc::new(ManualClock::new(now()));
        let requests = Arc::new(FakeRequestRepository::default());
        let minter = Arc::new(FakeSessionMinter::new(clock.clone()));
        let executor = GrantExecutor::new(
            minter.clone(),
            Arc::new(FakeClusterBinder::default()),
            Arc::new(FakeSecretStore::default()),
            clock.clone(),
            AccessDuration::MAX,
        );
        let mut settings = ReconcilerSettings::new("arn:aws:iam::123456789012:role/jit-access");
        settings.immediate_requeue = Duration::from_millis(5);
        let reconciler = Reconciler::new(
            requests.clone(),
            Arc::new(FakeJobRepository::default()),
            FakeClusterRepository::with(vec![target.clone()]).await,
            Arc::new(FakeRoleRegistry::default()),
            executor,
            Arc::new(FakeChatGateway::default()),
            clock,
            settings,
        );

        let new_request = RequestPolicy::default()
            .evaluate(
                "req-1",
                AccessRequestDraft {
                    requester_id: "U0000000001".to_owned(),
                    requester_email: "dev@example.com".to_owned(),
                    reason: "debugging ticket 4217".to_owned(),
                    duration: None,
                    permissions: None,
                    namespaces: Vec::new(),
                    approvers: None,
                },
                &target,
                now(),
            )
            .unwrap_or_else(|_| unreachable!());
        let _ = requests
            .create(AccessRequest::new(new_request).unwrap_or_else(|_| unreachable!()))
            .await;

        Fixture {
            requests,
            minter,
            controller: Controller::new(
                reconciler,
                ControllerSettings {
                    concurrency: 2,
                    resync_interval: Duration::from_secs(3600),
                    ..ControllerSettings::default()
                },
            ),
        }
    }

    async fn phase(fixture: &Fixture) -> Option<RequestPhase> {
        fixture
            .requests
            .find("req-1")
            .await
            .unwrap_or_default()
            .map(|request| request.phase())
    }

    #[derive(Default)]
    struct FakeLeases {
        held: AsyncMutex<bool>,
        acquired: AsyncMutex<u32>,
        released: AsyncMutex<u32>,
    }

    #[async_trait]
    impl ReconcileLeaseCoordinator for FakeLeases {
        async fn try_acquire(
            &self,
            key: &str,
            holder_id: &str,
            _lease_seconds: u32,
        ) -> AppResult<Option<ReconcileLease>> {
            if *self.held.lock().await {
                return Ok(None);
            }
            *self.acquired.lock().await += 1;
            Ok(Some(ReconcileLease {
                key: key.to_owned(),
                holder_id: holder_id.to_owned(),
                token: "token".to_owned(),
            }))
        }

        async fn release(&self, _lease: &ReconcileLease) -> AppResult<()> {
            *self.released.lock().await += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_drives_request_to_active_and_drains_on_shutdown() {
        let fixture = fixture().await;
        let shutdown = CancellationToken::new();
        let running = tokio::spawn({
            let controller = fixture.controller.clone();
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while phase(&fixture).await != Some(RequestPhase::Active)
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(phase(&fixture).await, Some(RequestPhase::Active));

        shutdown.cancel();
        assert!(running.await.is_ok());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_backoff() {
        let fixture = fixture().await;
        *fixture.minter.failure.lock().await = Some(AppError::Transient("throttled".to_owned()));
        let controller = &fixture.controller;

        controller.process(&ReconcileKey::Request("req-1".to_owned())).await;
        controller.process(&ReconcileKey::Request("req-1".to_owned())).await;
        let job_key = controller.queue.next().await.unwrap_or_else(|| unreachable!());
        controller.queue.done(&job_key);
        controller.process(&job_key).await;
        controller.process(&job_key).await;

        let failures = controller
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_key)
            .copied();
        assert_eq!(failures, Some(1));

        *fixture.minter.failure.lock().await = None;
        controller.process(&job_key).await;
        assert!(
            !controller
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&job_key)
        );
    }

    #[tokio::test]
    async fn contended_lease_defers_the_key() {
        let fixture = fixture().await;
        let leases = Arc::new(FakeLeases::default());
        *leases.held.lock().await = true;
        let controller = fixture.controller.clone().with_leases(leases.clone());

        controller.process(&ReconcileKey::Request("req-1".to_owned())).await;
        assert_eq!(phase(&fixture).await, Some(RequestPhase::Pending));
        assert_eq!(controller.queue.len(), 1);

        *leases.held.lock().await = false;
        controller.process(&ReconcileKey::Request("req-1".to_owned())).await;
        assert_eq!(phase(&fixture).await, Some(RequestPhase::Approved));
        assert_eq!(*leases.acquired.lock().await, 1);
        assert_eq!(*leases.released.lock().await, 1);
    }

    #[tokio::test]
    async fn trigger_feeds_the_queue() {
        let fixture = fixture().await;
        fixture
            .controller
            .trigger()
            .enqueue(ReconcileKey::Job("job-1".to_owned()))
            .await;

        assert_eq!(
            fixture.controller.queue.next().await,
            Some(ReconcileKey::Job("job-1".to_owned()))
        );
    }
}
