//! Top-level wiring: submit, track, and inspect evaluations.

use crate::catalog::DatasetCatalog;
use crate::config::{Config, EvaluationDefaults, ServiceConfig};
use crate::error::{OrchestratorError, Result};
use crate::poller::{Clock, PollHandle, PollPolicy, PollingScheduler, TokioClock};
use crate::registry::EvaluationRegistry;
use crate::remote::{EvaluationService, Gateway, HttpGateway};
use crate::submission::{DatasetSource, EvaluationConfig, Submitter};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Holds an id in the submitting set until dropped.
struct Reservation<'a> {
    submitting: &'a Mutex<HashSet<String>>,
    evaluation_id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.submitting
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.evaluation_id);
    }
}

/// Owns the shared gateway and registry and hands them to each component.
pub struct Orchestrator {
    gateway: Arc<dyn Gateway>,
    registry: Arc<EvaluationRegistry>,
    submitter: Submitter,
    scheduler: Arc<PollingScheduler>,
    service: EvaluationService,
    catalog: DatasetCatalog,
    defaults: EvaluationDefaults,
    // Ids between validation and the start of their polling loop.
    submitting: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        registry: Arc<EvaluationRegistry>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
        defaults: EvaluationDefaults,
    ) -> Self {
        let service = EvaluationService::new(Arc::clone(&gateway));
        let scheduler = Arc::new(PollingScheduler::new(
            service.clone(),
            Arc::clone(&registry),
            clock,
            policy,
        ));

        Self {
            submitter: Submitter::new(Arc::clone(&gateway), Arc::clone(&registry)),
            catalog: DatasetCatalog::new(Arc::clone(&gateway)),
            gateway,
            registry,
            scheduler,
            service,
            defaults,
            submitting: Mutex::new(HashSet::new()),
        }
    }

    /// Build an orchestrator talking HTTP, with the registry in the configured data directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let registry = match config.storage.resolve_data_dir() {
            Some(dir) => EvaluationRegistry::open(dir),
            None => {
                warn!("no data directory available, saved evaluations will not persist");
                EvaluationRegistry::in_memory()
            }
        };

        Ok(Self::new(
            Arc::new(HttpGateway::new(config.service.clone())),
            Arc::new(registry),
            Arc::new(TokioClock),
            config.polling.into(),
            config.defaults.clone(),
        ))
    }

    pub fn registry(&self) -> &EvaluationRegistry {
        &self.registry
    }

    pub fn service(&self) -> &EvaluationService {
        &self.service
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    pub fn defaults(&self) -> &EvaluationDefaults {
        &self.defaults
    }

    /// A fresh configuration carrying this orchestrator's defaults.
    pub fn new_config(&self, name: impl Into<String>, source: DatasetSource) -> EvaluationConfig {
        EvaluationConfig::new(name, source, &self.defaults)
    }

    /// Claim an id for submission. Fails if it is being submitted or polled.
    fn reserve(&self, evaluation_id: &str) -> Result<Reservation<'_>> {
        let mut submitting = self.submitting.lock().unwrap_or_else(|e| e.into_inner());
        if submitting.contains(evaluation_id) || self.scheduler.is_active(evaluation_id) {
            return Err(OrchestratorError::Validation(format!(
                "Evaluation {} is already being tracked",
                evaluation_id
            )));
        }
        submitting.insert(evaluation_id.to_string());
        Ok(Reservation {
            submitting: &self.submitting,
            evaluation_id: evaluation_id.to_string(),
        })
    }

    /// Submit an evaluation and start polling it.
    ///
    /// The id stays reserved until its polling loop is registered, so
    /// concurrent launches of one id submit it once.
    pub async fn launch(&self, config: &EvaluationConfig) -> Result<PollHandle> {
        config.validate()?;
        let _reservation = self.reserve(&config.id)?;

        let ack = self.submitter.submit(config).await?;
        Ok(self.scheduler.start(&ack.evaluation_id))
    }

    /// Start (or restart) polling an evaluation submitted earlier.
    pub fn track(&self, evaluation_id: &str) -> PollHandle {
        info!(evaluation_id, "tracking evaluation");
        self.scheduler.start(evaluation_id)
    }

    pub fn is_tracking(&self, evaluation_id: &str) -> bool {
        self.scheduler.is_active(evaluation_id)
    }

    pub fn cancel(&self, evaluation_id: &str) -> bool {
        self.scheduler.cancel(evaluation_id)
    }

    /// Point every component at new service settings.
    pub fn reconfigure(&self, service: ServiceConfig) -> Result<()> {
        if service.base_url.trim().is_empty() {
            return Err(OrchestratorError::Config("base_url must not be empty".to_string()));
        }
        info!(base_url = %service.base_url, "reconfiguring agent service");
        self.gateway.reconfigure(service);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollOutcome;
    use crate::registry::LifecycleStatus;
    use crate::remote::Endpoint;
    use crate::testing::{InstantClock, ScriptedGateway};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn orchestrator(gateway: Arc<ScriptedGateway>) -> Orchestrator {
        Orchestrator::new(
            gateway,
            Arc::new(EvaluationRegistry::in_memory()),
            Arc::new(InstantClock::default()),
            PollPolicy::default(),
            EvaluationDefaults::default(),
        )
    }

    fn happy_gateway() -> Arc<ScriptedGateway> {
        Arc::new(ScriptedGateway::new(|endpoint, body| match endpoint {
            Endpoint::Submission => Ok(json!({"status": "dataset_loaded"})),
            Endpoint::Query if body["operation"] == "get_evaluation_details" => Ok(json!({
                "evaluation": {
                    "evaluation_id": body["evaluation_id"],
                    "status": "comparison_completed",
                    "total_cases": 1
                },
                "status": "success"
            })),
            Endpoint::Query => Ok(json!({
                "cases": [{"case_id": "c1", "similarity_score": 92}]
            })),
            Endpoint::Catalog => Ok(json!({"success": true, "datasets": []})),
        }))
    }

    #[tokio::test]
    async fn test_launch_runs_to_completion() {
        let gateway = happy_gateway();
        let orchestrator = orchestrator(gateway.clone());
        let mut config = orchestrator.new_config("Heroes", DatasetSource::existing("heroes.json"));
        config.id = "eval_42".to_string();

        let handle = orchestrator.launch(&config).await.unwrap();
        assert_eq!(handle.evaluation_id(), "eval_42");

        let result = handle.outcome().await.into_result().unwrap();
        assert_eq!(result.id, "eval_42");
        assert_eq!(result.metrics.high_similarity_count, 1);
        assert_eq!(gateway.count_endpoint(Endpoint::Submission), 1);
        assert_eq!(
            orchestrator.registry().get("eval_42").unwrap().status,
            LifecycleStatus::Completed
        );
        assert!(!orchestrator.is_tracking("eval_42"));
    }

    #[tokio::test]
    async fn test_launch_rejects_invalid_config() {
        let gateway = happy_gateway();
        let orchestrator = orchestrator(gateway.clone());
        let config = orchestrator.new_config("  ", DatasetSource::existing("heroes.json"));

        let err = orchestrator.launch(&config).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert!(gateway.calls().is_empty());
        assert!(orchestrator.registry().list_all().is_empty());
    }

    #[tokio::test]
    async fn test_launch_rejects_tracked_id() {
        let gateway = Arc::new(ScriptedGateway::new(|_, _| Ok(json!({"status": "dataset_loaded"}))));
        let orchestrator = Orchestrator::new(
            gateway.clone(),
            Arc::new(EvaluationRegistry::in_memory()),
            Arc::new(TokioClock),
            PollPolicy {
                initial_delay: Duration::from_secs(3600),
                ..PollPolicy::default()
            },
            EvaluationDefaults::default(),
        );
        let mut config = orchestrator.new_config("Heroes", DatasetSource::existing("heroes.json"));
        config.id = "eval_7".to_string();

        let handle = orchestrator.launch(&config).await.unwrap();
        let err = orchestrator.launch(&config).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(gateway.count_endpoint(Endpoint::Submission), 1);

        assert!(orchestrator.cancel("eval_7"));
        assert_eq!(handle.outcome().await, PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_launches_of_one_id_submit_once() {
        let gateway = Arc::new(
            ScriptedGateway::new(|_, _| Ok(json!({"status": "dataset_loaded"})))
                .with_latency(Duration::from_secs(1)),
        );
        let orchestrator = Orchestrator::new(
            gateway.clone(),
            Arc::new(EvaluationRegistry::in_memory()),
            Arc::new(TokioClock),
            PollPolicy {
                initial_delay: Duration::from_secs(3600),
                ..PollPolicy::default()
            },
            EvaluationDefaults::default(),
        );
        let mut config = orchestrator.new_config("Heroes", DatasetSource::existing("heroes.json"));
        config.id = "eval_9".to_string();

        let (first, second) = tokio::join!(orchestrator.launch(&config), orchestrator.launch(&config));
        let (handle, err) = match (first, second) {
            (Ok(handle), Err(err)) | (Err(err), Ok(handle)) => (handle, err),
            other => panic!("expected exactly one launch to succeed, got {other:?}"),
        };

        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(gateway.count_endpoint(Endpoint::Submission), 1);
        assert!(orchestrator.is_tracking("eval_9"));

        handle.cancel();
        assert_eq!(handle.outcome().await, PollOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_submission_releases_id() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = attempts.clone();
        let gateway = Arc::new(ScriptedGateway::new(move |endpoint, _| {
            if endpoint == Endpoint::Submission
                && counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0
            {
                return Err(OrchestratorError::remote("connection refused"));
            }
            Ok(json!({"status": "dataset_loaded"}))
        }));
        let orchestrator = Orchestrator::new(
            gateway.clone(),
            Arc::new(EvaluationRegistry::in_memory()),
            Arc::new(TokioClock),
            PollPolicy {
                initial_delay: Duration::from_secs(3600),
                ..PollPolicy::default()
            },
            EvaluationDefaults::default(),
        );
        let mut config = orchestrator.new_config("Heroes", DatasetSource::existing("heroes.json"));
        config.id = "eval_10".to_string();

        assert!(orchestrator.launch(&config).await.is_err());
        assert!(!orchestrator.is_tracking("eval_10"));

        let handle = orchestrator.launch(&config).await.unwrap();
        assert_eq!(gateway.count_endpoint(Endpoint::Submission), 2);
        assert!(orchestrator.cancel("eval_10"));
        assert_eq!(handle.outcome().await, PollOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_track_resumes_polling() {
        let gateway = happy_gateway();
        let orchestrator = orchestrator(gateway.clone());

        let outcome = orchestrator.track("eval_old").outcome().await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(gateway.count_endpoint(Endpoint::Submission), 0);
    }

    #[tokio::test]
    async fn test_reconfigure_redirects_catalog_requests() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/datasets-agent")
            .match_header("authorization", "Bearer new-token")
            .with_status(200)
            .with_body(r#"{"success": true, "datasets": [{"name": "heroes.json", "items": 3}]}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = Config::with_service("http://127.0.0.1:1", "sub", "query", "catalog");
        config.storage.data_dir = Some(dir.path().to_path_buf());
        let orchestrator = Orchestrator::from_config(&config).unwrap();

        let mut service = config.service.clone();
        service.base_url = server.url();
        service.catalog_agent = "datasets-agent".to_string();
        service.api_token = Some("new-token".to_string());
        orchestrator.reconfigure(service).unwrap();

        let datasets = orchestrator.catalog().list_datasets().await.unwrap();
        assert_eq!(datasets[0].name, "heroes.json");
        mock.assert_async().await;
    }

    #[test]
    fn test_from_config_validates_service() {
        let err = Orchestrator::from_config(&Config::default()).err().unwrap();
        assert!(matches!(err, OrchestratorError::Config(_)));

        let dir = TempDir::new().unwrap();
        let mut config = Config::with_service("http://localhost:3500", "agent_a", "agent_b", "agent_c");
        config.storage.data_dir = Some(dir.path().to_path_buf());
        let orchestrator = Orchestrator::from_config(&config).unwrap();
        assert!(orchestrator.registry().list_all().is_empty());
        assert!(orchestrator.reconfigure(config.service.clone()).is_ok());
        assert!(orchestrator.reconfigure(ServiceConfig::default()).is_err());
    }
}
