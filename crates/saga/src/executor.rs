//! Step executor: retry loop and async suspension handling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{StepId, WorkflowId};

use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::instance::SagaLog;
use crate::registry::{AsyncStepRegistry, StepResolution};
use crate::step::{CompensationData, StepHandle, StepOutcome, WorkflowStep, DEFAULT_ASYNC_TIMEOUT};

/// Runs a single step to commitment or terminal failure.
///
/// Retryable failures and async timeouts are retried in place with the
/// step's fixed policy and never surface past the executor until the
/// budget is exhausted. A suspension parks the calling task on the
/// registry's resolution channel; the worker is yielded, not blocked.
pub struct StepExecutor {
    registry: Arc<AsyncStepRegistry>,
}

impl StepExecutor {
    /// Creates an executor backed by the given registry.
    pub fn new(registry: Arc<AsyncStepRegistry>) -> Self {
        Self { registry }
    }

    /// Executes the step's forward action, retrying per its policy, and
    /// returns the compensation payload to record on commit.
    pub async fn run_step<C: Send + Sync>(
        &self,
        workflow_id: WorkflowId,
        step: &dyn WorkflowStep<C>,
        ctx: &mut C,
        log: &SagaLog,
    ) -> Result<CompensationData> {
        let policy = step.retry_policy();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let handle = StepHandle {
                workflow_id,
                token: StepId::new(),
                attempt,
            };
            log.record(workflow_id, SagaEvent::step_started(step.name(), attempt));

            let outcome = match step.execute(ctx, &handle).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                    tracing::warn!(
                        step = step.name(),
                        attempt,
                        error = %err,
                        "step attempt failed, retrying"
                    );
                    metrics::counter!("saga_step_retries_total").increment(1);
                    tokio::time::sleep(policy.backoff).await;
                    continue;
                }
                Err(err) => {
                    log.record(
                        workflow_id,
                        SagaEvent::step_failed(step.name(), err.to_string()),
                    );
                    return Err(err);
                }
            };

            match outcome {
                StepOutcome::Completed { compensation } => {
                    log.record(
                        workflow_id,
                        SagaEvent::step_completed(step.name(), compensation.clone()),
                    );
                    return Ok(compensation);
                }
                StepOutcome::Suspended { compensation } => {
                    let deadline =
                        deadline_after(policy.timeout.unwrap_or(DEFAULT_ASYNC_TIMEOUT));
                    let receiver =
                        self.registry
                            .register(handle.token, workflow_id, step.name(), deadline)?;
                    log.record(
                        workflow_id,
                        SagaEvent::step_suspended(step.name(), handle.token, deadline),
                    );
                    tracing::info!(
                        step = step.name(),
                        token = %handle.token,
                        %deadline,
                        "step suspended awaiting external resolution"
                    );

                    match receiver.await {
                        Ok(StepResolution::Success { payload }) => {
                            log.record(
                                workflow_id,
                                SagaEvent::step_resumed(step.name(), handle.token, payload),
                            );
                            log.record(
                                workflow_id,
                                SagaEvent::step_completed(step.name(), compensation.clone()),
                            );
                            return Ok(compensation);
                        }
                        Ok(StepResolution::Failure { reason }) => {
                            log.record(workflow_id, SagaEvent::step_failed(step.name(), &reason));
                            return Err(SagaError::StepFailed {
                                step: step.name().to_string(),
                                reason,
                            });
                        }
                        // Err(_) means the registry dropped the sender
                        // without resolving; treat it like an expiry.
                        Ok(StepResolution::TimedOut) | Err(_) => {
                            if attempt <= policy.max_retries {
                                tracing::warn!(
                                    step = step.name(),
                                    attempt,
                                    "async step timed out, retrying"
                                );
                                metrics::counter!("saga_step_retries_total").increment(1);
                                tokio::time::sleep(policy.backoff).await;
                                continue;
                            }
                            log.record(
                                workflow_id,
                                SagaEvent::step_failed(
                                    step.name(),
                                    "timed out awaiting resolution",
                                ),
                            );
                            return Err(SagaError::Timeout {
                                step: step.name().to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
}

fn deadline_after(timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recorder {
        attempts: AtomicU32,
    }

    /// Fails with a retryable error until `succeed_on`, then completes.
    struct FlakyStep {
        recorder: Arc<Recorder>,
        succeed_on: u32,
        policy: RetryPolicy,
    }

    #[async_trait]
    impl WorkflowStep<()> for FlakyStep {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy
        }

        async fn execute(&self, _ctx: &mut (), _handle: &StepHandle) -> Result<StepOutcome> {
            let attempt = self.recorder.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < self.succeed_on {
                return Err(SagaError::Notifier("bus unavailable".to_string()));
            }
            Ok(StepOutcome::completed())
        }
    }

    /// Always fails with a fatal error.
    struct FatalStep;

    #[async_trait]
    impl WorkflowStep<()> for FatalStep {
        fn name(&self) -> &'static str {
            "fatal"
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::retries(3, Duration::ZERO)
        }

        async fn execute(&self, _ctx: &mut (), _handle: &StepHandle) -> Result<StepOutcome> {
            Err(SagaError::NotFound {
                entity: "delivery",
                id: "missing".to_string(),
            })
        }
    }

    /// Suspends on every attempt.
    struct SuspendingStep {
        policy: RetryPolicy,
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl WorkflowStep<()> for SuspendingStep {
        fn name(&self) -> &'static str {
            "suspending"
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy
        }

        async fn execute(&self, _ctx: &mut (), _handle: &StepHandle) -> Result<StepOutcome> {
            self.recorder.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(StepOutcome::suspended_with(CompensationData::None))
        }
    }

    fn executor() -> (StepExecutor, Arc<AsyncStepRegistry>, SagaLog) {
        let registry = Arc::new(AsyncStepRegistry::new());
        (StepExecutor::new(Arc::clone(&registry)), registry, SagaLog::new())
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried_to_success() {
        let (executor, _registry, log) = executor();
        let recorder = Arc::new(Recorder::default());
        let step = FlakyStep {
            recorder: Arc::clone(&recorder),
            succeed_on: 3,
            policy: RetryPolicy::retries(2, Duration::ZERO),
        };

        let workflow_id = WorkflowId::new();
        executor
            .run_step(workflow_id, &step, &mut (), &log)
            .await
            .unwrap();
        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_propagates() {
        let (executor, _registry, log) = executor();
        let recorder = Arc::new(Recorder::default());
        let step = FlakyStep {
            recorder: Arc::clone(&recorder),
            succeed_on: 10,
            policy: RetryPolicy::retries(2, Duration::ZERO),
        };

        let err = executor
            .run_step(WorkflowId::new(), &step, &mut (), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Notifier(_)));
        // 1 initial + 2 retries
        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_never_retried() {
        let (executor, _registry, log) = executor();
        let err = executor
            .run_step(WorkflowId::new(), &FatalStep, &mut (), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_suspension_resumes_on_external_success() {
        let (executor, registry, log) = executor();
        let recorder = Arc::new(Recorder::default());
        let step = SuspendingStep {
            policy: RetryPolicy::none().with_timeout(Duration::from_secs(60)),
            recorder,
        };
        let workflow_id = WorkflowId::new();

        let resolver_registry = Arc::clone(&registry);
        let resolver_log = log.clone();
        let resolver = tokio::spawn(async move {
            // Wait until the suspension is journaled, then resolve it.
            loop {
                if let Some(token) = resolver_log.suspended_token(workflow_id) {
                    resolver_registry
                        .resolve_success(token, serde_json::json!({"ok": true}))
                        .unwrap();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        executor
            .run_step(workflow_id, &step, &mut (), &log)
            .await
            .unwrap();
        resolver.await.unwrap();
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_external_failure_propagates_without_retry() {
        let (executor, registry, log) = executor();
        let recorder = Arc::new(Recorder::default());
        let step = SuspendingStep {
            policy: RetryPolicy::retries(2, Duration::ZERO)
                .with_timeout(Duration::from_secs(60)),
            recorder: Arc::clone(&recorder),
        };
        let workflow_id = WorkflowId::new();

        let resolver_registry = Arc::clone(&registry);
        let resolver_log = log.clone();
        tokio::spawn(async move {
            loop {
                if let Some(token) = resolver_log.suspended_token(workflow_id) {
                    resolver_registry
                        .resolve_failure(token, "restaurant rejected the order")
                        .unwrap();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let err = executor
            .run_step(workflow_id, &step, &mut (), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::StepFailed { .. }));
        // Explicit failure signals are fatal; no second attempt.
        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_retries_then_fails() {
        let (executor, registry, log) = executor();
        let _sweeper = Arc::clone(&registry).spawn_sweeper(Duration::from_millis(5));
        let recorder = Arc::new(Recorder::default());
        let step = SuspendingStep {
            policy: RetryPolicy::retries(1, Duration::ZERO)
                .with_timeout(Duration::from_millis(20)),
            recorder: Arc::clone(&recorder),
        };

        let err = executor
            .run_step(WorkflowId::new(), &step, &mut (), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Timeout { .. }));
        // 1 initial + 1 retry, each suspended and expired.
        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 2);
        _sweeper.abort();
    }
}
