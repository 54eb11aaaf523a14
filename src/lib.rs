//! Evaluation Orchestrator - client-side lifecycle management for evaluation
//! jobs executed by a remote agent service.
//!
//! # Overview
//!
//! The agent service runs the heavy part of an evaluation (loading the
//! dataset, running the model, judging similarity). This crate:
//! 1. Validates an evaluation configuration and submits it
//! 2. Records the evaluation in a small local registry
//! 3. Polls the service until the evaluation completes, fails, or times out
//! 4. Normalizes the inconsistent result payloads into one typed shape
//!
//! # Quick Start
//!
//! ```no_run
//! use eval_orchestrator::{
//!     config::Config,
//!     orchestrator::Orchestrator,
//!     submission::DatasetSource,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!
//!     let evaluation = orchestrator.new_config(
//!         "Superhero QA",
//!         DatasetSource::existing("superhero_powers.json"),
//!     );
//!     let handle = orchestrator.launch(&evaluation).await?;
//!     let result = handle.outcome().await.into_result()?;
//!
//!     println!(
//!         "{}: {:.1}% high similarity over {} cases",
//!         result.id,
//!         result.metrics.high_similarity_rate * 100.0,
//!         result.metrics.total_cases
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Gateway**: JSON-over-HTTP transport to the three agent endpoints
//! - **EvaluationRegistry**: bounded most-recent-first list of saved evaluations
//! - **Submitter**: validation, payload construction, and submission
//! - **PollingScheduler**: one bounded polling loop per evaluation id
//! - **normalize**: reconciles raw payloads into `EvaluationResult`
//! - **DatasetCatalog**: dataset listing and previews

pub mod catalog;
pub mod config;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod remote;
pub mod submission;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use catalog::{Dataset, DatasetCatalog, DatasetPreview};
pub use config::Config;
pub use error::{OrchestratorError, Result};
pub use normalize::{EvaluationResult, EvaluationSummary, RemoteStatus, SimilarityCategory};
pub use orchestrator::Orchestrator;
pub use poller::{PollHandle, PollOutcome, PollingScheduler};
pub use registry::{EvaluationRegistry, LifecycleStatus, SavedEvaluation};
pub use remote::{EvaluationService, Gateway, HttpGateway};
pub use submission::{DatasetSource, EvaluationConfig, Submitter};
