//! Status polling for submitted evaluations.
//!
//! After a submission is accepted the service runs the pipeline on its own;
//! the only way to learn the outcome is to ask. [`PollingScheduler`] runs one
//! bounded loop per evaluation id: wait a grace period, query the details,
//! stop on a terminal status, otherwise wait and ask again until the attempt
//! budget is spent.

use crate::config::PollingConfig;
use crate::error::{OrchestratorError, Result};
use crate::normalize::{self, EvaluationResult};
use crate::registry::{EvaluationRegistry, LifecycleStatus};
use crate::remote::EvaluationService;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const FAILED_MESSAGE: &str = "Evaluation failed during processing";
pub const TIMEOUT_MESSAGE: &str = "Evaluation timed out - please check the results page later";
pub const UNREACHABLE_MESSAGE: &str =
    "Unable to check evaluation status - please check the results page manually";

/// Source of delays, injectable so tests do not wait in real time.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Timing of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollingConfig::default().into()
    }
}

impl From<PollingConfig> for PollPolicy {
    fn from(config: PollingConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            interval: config.interval(),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The pipeline finished; the normalized result.
    Completed(Box<EvaluationResult>),
    /// The service reported the evaluation as failed.
    Failed(String),
    /// The attempt budget ran out while the evaluation was still in progress.
    TimedOut(String),
    /// The attempt budget ran out without a single answer from the service.
    Unreachable(String),
    /// The loop was cancelled; nothing was recorded.
    Cancelled,
}

impl PollOutcome {
    /// Local lifecycle status this outcome was recorded as.
    pub fn lifecycle_status(&self) -> Option<LifecycleStatus> {
        match self {
            PollOutcome::Completed(_) => Some(LifecycleStatus::Completed),
            PollOutcome::Failed(_) | PollOutcome::TimedOut(_) | PollOutcome::Unreachable(_) => {
                Some(LifecycleStatus::Failed)
            }
            PollOutcome::Cancelled => None,
        }
    }

    /// Convert into the crate's error channel.
    pub fn into_result(self) -> Result<EvaluationResult> {
        match self {
            PollOutcome::Completed(result) => Ok(*result),
            PollOutcome::Failed(message) => Err(OrchestratorError::Logical(message)),
            PollOutcome::TimedOut(message) | PollOutcome::Unreachable(message) => {
                Err(OrchestratorError::Timeout(message))
            }
            PollOutcome::Cancelled => Err(OrchestratorError::Logical(
                "Polling was cancelled".to_string(),
            )),
        }
    }
}

/// A running polling loop.
#[derive(Debug)]
pub struct PollHandle {
    evaluation_id: String,
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn evaluation_id(&self) -> &str {
        &self.evaluation_id
    }

    /// Stop scheduling further checks. An in-flight query still completes
    /// but its result is discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this loop, usable after the handle is consumed.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the loop to finish.
    pub async fn outcome(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(evaluation_id = %self.evaluation_id, error = %e, "polling task aborted");
                PollOutcome::Cancelled
            }
        }
    }
}

struct ActivePoll {
    generation: u64,
    token: CancellationToken,
    // Held by the loop for its whole lifetime; a successor waits on it.
    lease: Arc<tokio::sync::Mutex<()>>,
}

/// Runs at most one polling loop per evaluation id.
pub struct PollingScheduler {
    service: EvaluationService,
    registry: Arc<EvaluationRegistry>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    active: Mutex<HashMap<String, ActivePoll>>,
    next_generation: AtomicU64,
}

impl PollingScheduler {
    pub fn new(
        service: EvaluationService,
        registry: Arc<EvaluationRegistry>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            service,
            registry,
            clock,
            policy,
            active: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, ActivePoll>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a loop is currently registered for the id.
    pub fn is_active(&self, evaluation_id: &str) -> bool {
        self.active().contains_key(evaluation_id)
    }

    /// Cancel the loop for an id. Returns false if none was running.
    pub fn cancel(&self, evaluation_id: &str) -> bool {
        match self.active().get(evaluation_id) {
            Some(poll) => {
                poll.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Start polling an evaluation.
    ///
    /// A loop already running for the same id is cancelled, and the new loop
    /// does not query until the old one has finished.
    pub fn start(self: &Arc<Self>, evaluation_id: &str) -> PollHandle {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let lease = {
            let mut active = self.active();
            let lease = match active.get(evaluation_id) {
                Some(previous) => {
                    debug!(evaluation_id, "replacing active polling loop");
                    previous.token.cancel();
                    Arc::clone(&previous.lease)
                }
                None => Arc::new(tokio::sync::Mutex::new(())),
            };
            active.insert(
                evaluation_id.to_string(),
                ActivePoll {
                    generation,
                    token: token.clone(),
                    lease: Arc::clone(&lease),
                },
            );
            lease
        };

        let scheduler = Arc::clone(self);
        let id = evaluation_id.to_string();
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            let _lease = lease.lock_owned().await;
            let outcome = if loop_token.is_cancelled() {
                PollOutcome::Cancelled
            } else {
                scheduler.run(&id, &loop_token).await
            };
            scheduler.release(&id, generation);
            outcome
        });

        PollHandle {
            evaluation_id: evaluation_id.to_string(),
            token,
            task,
        }
    }

    fn release(&self, evaluation_id: &str, generation: u64) {
        let mut active = self.active();
        if active
            .get(evaluation_id)
            .is_some_and(|poll| poll.generation == generation)
        {
            active.remove(evaluation_id);
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = self.clock.sleep(duration) => true,
        }
    }

    fn record(&self, evaluation_id: &str, status: LifecycleStatus) {
        if let Err(e) = self.registry.update_status(evaluation_id, status) {
            warn!(evaluation_id, %status, error = %e, "failed to update saved evaluation");
        }
    }

    /// The polling loop itself.
    ///
    /// Callers should go through [`PollingScheduler::start`], which keeps
    /// loops for the same id from overlapping.
    pub async fn run(&self, evaluation_id: &str, token: &CancellationToken) -> PollOutcome {
        if !self.pause(self.policy.initial_delay, token).await {
            return PollOutcome::Cancelled;
        }

        let mut answered = false;
        let mut attempt: u32 = 1;

        loop {
            let details = self.service.get_evaluation_details(evaluation_id).await;
            if token.is_cancelled() {
                debug!(evaluation_id, attempt, "polling cancelled");
                return PollOutcome::Cancelled;
            }

            match details {
                Ok(details) => {
                    answered = true;
                    let status = normalize::remote_status(&details);
                    debug!(evaluation_id, attempt, status = ?status, "polled evaluation status");

                    match status {
                        Some(status) if status.is_success() => {
                            self.record(evaluation_id, LifecycleStatus::Completed);
                            let result = self.service.complete_result(evaluation_id, &details).await;
                            info!(
                                evaluation_id,
                                attempt,
                                total_cases = result.metrics.total_cases,
                                "evaluation completed"
                            );
                            return PollOutcome::Completed(Box::new(result));
                        }
                        Some(status) if status.is_failure() => {
                            self.record(evaluation_id, LifecycleStatus::Failed);
                            info!(evaluation_id, attempt, "evaluation failed remotely");
                            return PollOutcome::Failed(FAILED_MESSAGE.to_string());
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    // The results agent answers "not found" until the
                    // comparison step has written its data.
                    if !matches!(e, OrchestratorError::Remote { .. }) {
                        answered = true;
                    }
                    debug!(evaluation_id, attempt, error = %e, "status check failed, still running");
                }
            }

            if attempt >= self.policy.max_attempts {
                self.record(evaluation_id, LifecycleStatus::Failed);
                warn!(evaluation_id, attempt, answered, "gave up polling evaluation");
                return if answered {
                    PollOutcome::TimedOut(TIMEOUT_MESSAGE.to_string())
                } else {
                    PollOutcome::Unreachable(UNREACHABLE_MESSAGE.to_string())
                };
            }

            attempt += 1;
            if !self.pause(self.policy.interval, token).await {
                return PollOutcome::Cancelled;
            }
        }
    }
}
