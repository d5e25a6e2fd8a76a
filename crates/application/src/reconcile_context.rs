use std::future::Future;
use std::time::Duration;

use jit_core::{AppError, AppResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default bound on a single external call.
pub const DEFAULT_EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline and cancel signal threaded through one reconcile run.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    deadline: Instant,
    cancel: CancellationToken,
    call_timeout: Duration,
}

impl ReconcileContext {
    /// Creates a context that expires after `budget`.
    #[must_use]
    pub fn new(budget: Duration, call_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + budget,
            cancel,
            call_timeout,
        }
    }

    /// Creates a context with default bounds and its own cancel token.
    #[must_use]
    pub fn background() -> Self {
        Self::new(
            Duration::from_secs(60),
            DEFAULT_EXTERNAL_CALL_TIMEOUT,
            CancellationToken::new(),
        )
    }

    /// Returns the cancel signal.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns whether the deadline passed or the run was cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Runs one external call bounded by the call timeout, the remaining
    /// deadline and the cancel signal.
    ///
    /// Surrendering yields `Transient` so callers requeue instead of blocking.
    pub async fn call<T, F>(&self, operation: &str, future: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AppError::Transient(format!(
                "reconcile deadline exceeded before {operation}"
            )));
        }

        let budget = remaining.min(self.call_timeout);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AppError::Transient(format!(
                "{operation} cancelled"
            ))),
            result = tokio::time::timeout(budget, future) => result.map_err(|_| {
                AppError::Transient(format!(
                    "{operation} timed out after {}ms",
                    budget.as_millis()
                ))
            })?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_transient() {
        let context = ReconcileContext::new(
            Duration::from_secs(60),
            Duration::from_secs(1),
            CancellationToken::new(),
        );

        let result = context
            .call("describe cluster", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AppError>(())
            })
            .await;

        assert!(matches!(result, Err(AppError::Transient(_))));
    }

    #[tokio::test]
    async fn cancelled_context_surrenders() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let context = ReconcileContext::new(Duration::from_secs(60), Duration::from_secs(30), cancel);

        let result = context
            .call("mint session", std::future::pending::<AppResult<()>>())
            .await;

        assert!(matches!(result, Err(AppError::Transient(_))));
        assert!(context.is_done());
    }

    #[tokio::test]
    async fn completed_call_passes_result_through() {
        let context = ReconcileContext::background();
        let result = context.call("noop", async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
