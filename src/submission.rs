//! Evaluation submission.
//!
//! Validates a user-authored [`EvaluationConfig`], builds the payload the
//! dataset loader agent expects and records the evaluation locally around
//! the network call.

use crate::config::EvaluationDefaults;
use crate::error::{OrchestratorError, Result};
use crate::normalize;
use crate::registry::{
    ConfigSnapshot, DatasetSourceKind, EvaluationRegistry, LifecycleStatus, SavedEvaluation,
};
use crate::remote::{Endpoint, Gateway};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Format tag understood by the dataset loader.
pub const SUBMISSION_FORMAT: &str = "query_response_pairs";

/// The single variable a prompt template may reference.
pub const QUERY_VARIABLE: &str = "query";

/// How the variable appears in a template.
pub const QUERY_PLACEHOLDER: &str = "{{query}}";

/// Prefix of catalog references in `dataset_path`.
const DATASET_PATH_PREFIX: &str = "datasets/";

/// Where the evaluation's cases come from.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    /// A dataset already known to the service's catalog.
    Existing { dataset: String },
    /// Raw JSON text of an uploaded dataset file.
    Upload { content: String },
}

impl DatasetSource {
    pub fn existing(dataset: impl Into<String>) -> Self {
        DatasetSource::Existing {
            dataset: dataset.into(),
        }
    }

    pub fn upload(content: impl Into<String>) -> Self {
        DatasetSource::Upload {
            content: content.into(),
        }
    }

    /// Read an upload source from a file on disk.
    pub fn upload_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| OrchestratorError::io(path, e))?;
        Ok(Self::upload(content))
    }

    pub fn kind(&self) -> DatasetSourceKind {
        match self {
            DatasetSource::Existing { .. } => DatasetSourceKind::Existing,
            DatasetSource::Upload { .. } => DatasetSourceKind::Upload,
        }
    }
}

/// Parse uploaded JSON into structured records.
pub fn parse_records(content: &str) -> Result<Vec<Map<String, Value>>> {
    let invalid = || OrchestratorError::Validation("Invalid JSON file format".to_string());

    let value: Value = serde_json::from_str(content).map_err(|_| invalid())?;
    let Value::Array(items) = value else {
        return Err(invalid());
    };

    let records = items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>>>()?;

    if records.is_empty() {
        return Err(OrchestratorError::Validation(
            "The uploaded dataset contains no records".to_string(),
        ));
    }

    Ok(records)
}

/// Dataset part of the payload, resolved from a validated source.
#[derive(Debug, Clone, PartialEq)]
enum DatasetPayload {
    Path(String),
    Records(Vec<Map<String, Value>>),
}

/// User-authored evaluation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub id: String,
    pub name: String,
    pub dataset_source: DatasetSource,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub judge_model: String,
    /// 0-100.
    pub similarity_threshold: u8,
    pub prompt_template: String,
}

impl EvaluationConfig {
    /// New configuration with a time-based id and the given defaults.
    pub fn new(
        name: impl Into<String>,
        dataset_source: DatasetSource,
        defaults: &EvaluationDefaults,
    ) -> Self {
        Self {
            id: format!("eval_{}", Utc::now().timestamp_millis()),
            name: name.into(),
            dataset_source,
            model_name: defaults.model_name.clone(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            judge_model: defaults.judge_model.clone(),
            similarity_threshold: defaults.similarity_threshold,
            prompt_template: defaults.prompt_template.clone(),
        }
    }

    /// Check the configuration; the first failing rule wins.
    pub fn validate(&self) -> Result<()> {
        self.resolve_dataset().map(|_| ())
    }

    fn resolve_dataset(&self) -> Result<DatasetPayload> {
        let fail = |msg: &str| Err(OrchestratorError::Validation(msg.to_string()));

        if self.name.trim().is_empty() {
            return fail("Please enter an evaluation name");
        }

        let dataset = match &self.dataset_source {
            DatasetSource::Existing { dataset } => {
                if dataset.trim().is_empty() {
                    return fail("Please select a dataset");
                }
                DatasetPayload::Path(format!("{}{}", DATASET_PATH_PREFIX, dataset.trim()))
            }
            DatasetSource::Upload { content } => {
                if content.trim().is_empty() {
                    return fail("Please upload a dataset file");
                }
                DatasetPayload::Records(parse_records(content)?)
            }
        };

        if self.similarity_threshold > 100 {
            return fail("Similarity threshold must be between 0 and 100");
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return fail("Temperature must be between 0 and 2");
        }
        if self.max_tokens == 0 {
            return fail("Max tokens must be greater than 0");
        }
        if !self.prompt_template.contains(QUERY_PLACEHOLDER) {
            return Err(OrchestratorError::Validation(format!(
                "Prompt template must contain {}",
                QUERY_PLACEHOLDER
            )));
        }
        if self.id.trim().is_empty() {
            return fail("Evaluation id must not be empty");
        }

        Ok(dataset)
    }

    /// Validate and build the submission payload.
    pub fn build_payload(&self) -> Result<Value> {
        let dataset = self.resolve_dataset()?;

        let mut payload = json!({
            "evaluation_id": self.id,
            "format": SUBMISSION_FORMAT,
            "prompt_template": {
                "template": self.prompt_template,
                "variables": [QUERY_VARIABLE],
            },
            "model_config": {
                "model_name": self.model_name,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            },
            "evaluation_settings": {
                "similarity_threshold": self.similarity_threshold,
                "judge_model": self.judge_model,
            },
        });

        if let Value::Object(map) = &mut payload {
            match dataset {
                DatasetPayload::Path(path) => {
                    map.insert("dataset_path".to_string(), Value::String(path));
                }
                DatasetPayload::Records(records) => {
                    let records = records.into_iter().map(Value::Object).collect();
                    map.insert("dataset_json".to_string(), Value::Array(records));
                }
            }
        }

        Ok(payload)
    }

    /// The fields frozen into the local record.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            model_name: self.model_name.clone(),
            judge_model: self.judge_model.clone(),
            dataset_source: self.dataset_source.kind(),
            selected_dataset: match &self.dataset_source {
                DatasetSource::Existing { dataset } => Some(dataset.trim().to_string()),
                DatasetSource::Upload { .. } => None,
            },
            similarity_threshold: self.similarity_threshold,
        }
    }
}

/// Confirmation that the service accepted a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAck {
    pub evaluation_id: String,
}

/// Sends evaluations to the dataset loader agent.
#[derive(Clone)]
pub struct Submitter {
    gateway: Arc<dyn Gateway>,
    registry: Arc<EvaluationRegistry>,
}

impl Submitter {
    pub fn new(gateway: Arc<dyn Gateway>, registry: Arc<EvaluationRegistry>) -> Self {
        Self { gateway, registry }
    }

    fn record_status(&self, id: &str, status: LifecycleStatus) {
        if let Err(e) = self.registry.update_status(id, status) {
            warn!(evaluation_id = id, %status, error = %e, "failed to update saved evaluation");
        }
    }

    /// Submit an evaluation.
    ///
    /// Only confirms acceptance; completion is tracked by the poller.
    pub async fn submit(&self, config: &EvaluationConfig) -> Result<SubmissionAck> {
        let payload = config.build_payload()?;

        let record = SavedEvaluation {
            id: config.id.clone(),
            name: config.name.clone(),
            created_at: Utc::now(),
            status: LifecycleStatus::Created,
            config: config.snapshot(),
        };
        self.registry.save(record)?;

        let response = match self.gateway.post(Endpoint::Submission, payload).await {
            Ok(response) => response,
            Err(e) => {
                warn!(evaluation_id = %config.id, error = %e, "submission failed");
                self.record_status(&config.id, LifecycleStatus::Failed);
                return Err(e);
            }
        };

        if let Some(message) = normalize::logical_error(&response) {
            warn!(evaluation_id = %config.id, %message, "submission rejected");
            self.record_status(&config.id, LifecycleStatus::Failed);
            return Err(OrchestratorError::Logical(message));
        }

        self.record_status(&config.id, LifecycleStatus::Running);
        info!(evaluation_id = %config.id, name = %config.name, "evaluation submitted");

        Ok(SubmissionAck {
            evaluation_id: config.id.clone(),
        })
    }
}
