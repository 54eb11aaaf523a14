//! Typed operations of the query endpoint.

use super::gateway::{Endpoint, Gateway};
use crate::error::Result;
use crate::normalize::{self, EvaluationResult, EvaluationSummary, RawPayload};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Client for the results agent.
///
/// Returns raw payloads where the caller needs to decide what to do with
/// partial data, and normalized values everywhere else.
#[derive(Clone)]
pub struct EvaluationService {
    gateway: Arc<dyn Gateway>,
}

impl EvaluationService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// All evaluations known to the service.
    pub async fn list_evaluations(&self) -> Result<Vec<EvaluationSummary>> {
        let response = self
            .gateway
            .post(Endpoint::Query, json!({ "operation": "list_evaluations" }))
            .await?;
        let raw = normalize::summaries_envelope(&response)?;
        Ok(raw.iter().map(normalize::normalize_summary).collect())
    }

    /// Raw details of one evaluation.
    pub async fn get_evaluation_details(&self, evaluation_id: &str) -> Result<RawPayload> {
        let response = self
            .gateway
            .post(
                Endpoint::Query,
                json!({
                    "operation": "get_evaluation_details",
                    "evaluation_id": evaluation_id,
                }),
            )
            .await?;
        normalize::details_envelope(&response)
    }

    /// Raw per-case comparisons of one evaluation.
    pub async fn get_evaluation_cases(&self, evaluation_id: &str) -> Result<Vec<RawPayload>> {
        let response = self
            .gateway
            .post(
                Endpoint::Query,
                json!({
                    "operation": "get_evaluation_cases",
                    "evaluation_id": evaluation_id,
                }),
            )
            .await?;
        normalize::cases_envelope(&response)
    }

    /// Normalize already-fetched details, fetching the case list to go with them.
    ///
    /// A failed case fetch falls back to the cases embedded in the details.
    pub async fn complete_result(&self, evaluation_id: &str, details: &RawPayload) -> EvaluationResult {
        let cases = match self.get_evaluation_cases(evaluation_id).await {
            Ok(cases) => cases,
            Err(e) => {
                warn!(evaluation_id, error = %e, "failed to fetch evaluation cases");
                Vec::new()
            }
        };
        let mut result = normalize::normalize(details, &cases);
        if result.id.is_empty() {
            result.id = evaluation_id.to_string();
        }
        result
    }

    /// Details and cases of one evaluation, normalized.
    pub async fn get_evaluation_result(&self, evaluation_id: &str) -> Result<EvaluationResult> {
        let details = self.get_evaluation_details(evaluation_id).await?;
        Ok(self.complete_result(evaluation_id, &details).await)
    }
}
