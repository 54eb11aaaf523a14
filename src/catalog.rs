//! Dataset catalog: what the service can evaluate against.

use crate::error::{OrchestratorError, Result};
use crate::remote::{Endpoint, Gateway};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_PREVIEW_ITEMS: usize = 3;

const LIST_FAILED: &str = "Failed to fetch datasets";
const PREVIEW_FAILED: &str = "Failed to fetch dataset preview";
const VALIDATE_FAILED: &str = "Failed to validate dataset";

/// A dataset file known to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub items: u64,
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// First few records of a dataset plus its inferred field types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPreview {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub preview: Vec<Map<String, Value>>,
    #[serde(default)]
    pub schema: BTreeMap<String, String>,
}

impl DatasetPreview {
    /// Build a preview locally, e.g. for a file about to be uploaded.
    pub fn from_records(
        filename: impl Into<String>,
        records: &[Map<String, Value>],
        max_items: usize,
    ) -> Self {
        Self {
            filename: filename.into(),
            total_items: records.len(),
            preview: records.iter().take(max_items).cloned().collect(),
            schema: infer_schema(records),
        }
    }
}

/// Outcome of a server-side format check.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValidation {
    Valid(String),
    Invalid(String),
}

impl DatasetValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, DatasetValidation::Valid(_))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "unknown",
    }
}

/// Field types of a dataset, taken from its first record only.
pub fn infer_schema(records: &[Map<String, Value>]) -> BTreeMap<String, String> {
    records
        .first()
        .map(|first| {
            first
                .iter()
                .map(|(key, value)| (key.clone(), type_name(value).to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Catalog responses flag failure with `success: false`.
fn check_success(response: &Value, default_message: &str) -> Result<()> {
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        let message = response
            .get("error")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(default_message);
        return Err(OrchestratorError::Logical(message.to_string()));
    }
    Ok(())
}

/// Client for the catalog agent.
#[derive(Clone)]
pub struct DatasetCatalog {
    gateway: Arc<dyn Gateway>,
}

impl DatasetCatalog {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// All datasets, sorted by name as the service returns them.
    pub async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let response = self
            .gateway
            .post(Endpoint::Catalog, json!({ "operation": "list_datasets" }))
            .await?;
        check_success(&response, LIST_FAILED)?;

        let datasets = match response.get("datasets") {
            Some(value) => Vec::<Dataset>::deserialize(value)?,
            None => Vec::new(),
        };
        debug!(count = datasets.len(), "listed datasets");
        Ok(datasets)
    }

    pub async fn get_dataset_preview(&self, filename: &str, max_items: usize) -> Result<DatasetPreview> {
        let response = self
            .gateway
            .post(
                Endpoint::Catalog,
                json!({
                    "operation": "get_dataset_preview",
                    "filename": filename,
                    "max_items": max_items,
                }),
            )
            .await?;
        check_success(&response, PREVIEW_FAILED)?;

        let mut preview = DatasetPreview::deserialize(&response)?;
        if preview.filename.is_empty() {
            preview.filename = filename.to_string();
        }
        Ok(preview)
    }

    /// Ask the service whether a dataset file is a readable JSON array.
    pub async fn validate_dataset(&self, filename: &str) -> Result<DatasetValidation> {
        let response = self
            .gateway
            .post(
                Endpoint::Catalog,
                json!({ "operation": "validate_dataset", "filename": filename }),
            )
            .await?;
        check_success(&response, VALIDATE_FAILED)?;

        let text = |key: &str| {
            response
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        if response.get("valid").and_then(Value::as_bool).unwrap_or(false) {
            Ok(DatasetValidation::Valid(
                text("message").unwrap_or_else(|| format!("Dataset {} is valid", filename)),
            ))
        } else {
            Ok(DatasetValidation::Invalid(
                text("error").unwrap_or_else(|| format!("Dataset {} is invalid", filename)),
            ))
        }
    }
}
