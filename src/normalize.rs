//! Reconciles raw result payloads into the canonical evaluation result.
//!
//! The agent service is not consistent about field naming: some payloads are
//! snake_case, some were already camel-cased by an intermediate agent, and
//! list summaries nest their metrics under `results`. Every accepted raw name
//! is listed in the `FIELD_*` tables below, and this module is the only place
//! that reads raw remote fields.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

// Accepted raw field names, in lookup order.
const FIELD_ID: &[&str] = &["evaluation_id", "evaluationId", "id"];
const FIELD_STATUS: &[&str] = &["status"];
const FIELD_STARTED_AT: &[&str] = &["startedAt", "started_at"];
const FIELD_COMPLETED_AT: &[&str] = &["completedAt", "completed_at"];
const FIELD_DATASET_NAME: &[&str] = &["dataset_name", "datasetName"];
const FIELD_MODEL_NAME: &[&str] = &["model_name", "modelName"];
const FIELD_JUDGE_MODEL: &[&str] = &["judge_model", "judgeModel"];
const FIELD_THRESHOLD: &[&str] = &["similarity_threshold", "similarityThreshold", "threshold"];
const FIELD_TOTAL_CASES: &[&str] = &["total_cases", "totalCases"];
const FIELD_AVERAGE: &[&str] = &[
    "average_similarity_score",
    "averageSimilarityScore",
    "average_similarity",
];
const FIELD_HIGH_COUNT: &[&str] = &["high_similarity_count", "highSimilarityCount"];
const FIELD_MEDIUM_COUNT: &[&str] = &["medium_similarity_count", "mediumSimilarityCount"];
const FIELD_LOW_COUNT: &[&str] = &["low_similarity_count", "lowSimilarityCount"];
/// Object holding pre-aggregated metrics in list summaries.
const FIELD_NESTED_METRICS: &str = "results";
const FIELD_CASES: &[&str] = &["comparison_results", "cases"];

const FIELD_CASE_ID: &[&str] = &["case_id", "caseId", "id"];
const FIELD_CASE_QUERY: &[&str] = &["original_query", "originalQuery", "query"];
const FIELD_CASE_EXPECTED: &[&str] = &["expected_response", "expectedResponse"];
const FIELD_CASE_RESPONSE: &[&str] = &["model_response", "modelResponse"];
const FIELD_CASE_SCORE: &[&str] = &["similarity_score", "similarityScore"];
const FIELD_CASE_CATEGORY: &[&str] = &["similarity_category", "similarityCategory"];
const FIELD_CASE_REASONING: &[&str] = &["judge_reasoning", "judgeReasoning"];
const FIELD_CASE_SUCCESS: &[&str] = &["success"];

// Envelope keys of the query endpoint responses.
const ENVELOPE_EVALUATION: &str = "evaluation";
const ENVELOPE_EVALUATIONS: &str = "evaluations";
const ENVELOPE_CASES: &str = "cases";
const ENVELOPE_ERROR: &str = "error";

/// Scores at or above this are `high`.
pub const HIGH_SIMILARITY_MIN: f64 = 80.0;
/// Scores at or above this (and below [`HIGH_SIMILARITY_MIN`]) are `medium`.
pub const MEDIUM_SIMILARITY_MIN: f64 = 50.0;

/// A loosely-typed JSON object as received from the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Map<String, Value>);

impl RawPayload {
    /// Wrap a JSON value; anything but an object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// First non-null value among the given names.
    fn get(&self, names: &[&str]) -> Option<&Value> {
        names
            .iter()
            .filter_map(|name| self.0.get(*name))
            .find(|v| !v.is_null())
    }

    fn string(&self, names: &[&str]) -> Option<String> {
        match self.get(names)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn number(&self, names: &[&str]) -> Option<f64> {
        match self.get(names)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn count(&self, names: &[&str]) -> Option<u64> {
        self.number(names)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as u64)
    }

    fn boolean(&self, names: &[&str]) -> Option<bool> {
        self.get(names)?.as_bool()
    }

    fn nested(&self, key: &str) -> Option<RawPayload> {
        self.0.get(key).cloned().and_then(RawPayload::from_value)
    }

    fn list(&self, names: &[&str]) -> Vec<Value> {
        self.get(names)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

/// Coarse similarity bucket, always derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityCategory {
    High,
    Medium,
    Low,
}

impl SimilarityCategory {
    /// Bucket a 0-100 score.
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_SIMILARITY_MIN {
            SimilarityCategory::High
        } else if score >= MEDIUM_SIMILARITY_MIN {
            SimilarityCategory::Medium
        } else {
            SimilarityCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityCategory::High => "high",
            SimilarityCategory::Medium => "medium",
            SimilarityCategory::Low => "low",
        }
    }
}

impl fmt::Display for SimilarityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status vocabulary reported by the service.
///
/// Broader than the local lifecycle: the pipeline reports intermediate
/// phases, all of which count as "still running" locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Completed,
    ComparisonCompleted,
    Failed,
    Running,
    DatasetLoaded,
    ExecutionCompleted,
    Unknown,
    Other(String),
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "completed" => RemoteStatus::Completed,
            "comparison_completed" => RemoteStatus::ComparisonCompleted,
            "failed" => RemoteStatus::Failed,
            "running" => RemoteStatus::Running,
            "dataset_loaded" => RemoteStatus::DatasetLoaded,
            "execution_completed" => RemoteStatus::ExecutionCompleted,
            "unknown" | "" => RemoteStatus::Unknown,
            _ => RemoteStatus::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RemoteStatus::Completed => "completed",
            RemoteStatus::ComparisonCompleted => "comparison_completed",
            RemoteStatus::Failed => "failed",
            RemoteStatus::Running => "running",
            RemoteStatus::DatasetLoaded => "dataset_loaded",
            RemoteStatus::ExecutionCompleted => "execution_completed",
            RemoteStatus::Unknown => "unknown",
            RemoteStatus::Other(s) => s,
        }
    }

    /// Both spellings of "done" used by the pipeline.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Completed | RemoteStatus::ComparisonCompleted
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RemoteStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RemoteStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One query/expected/actual triple with its similarity verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonCase {
    pub case_id: String,
    pub original_query: String,
    pub expected_response: String,
    pub model_response: String,
    /// 0-100.
    pub similarity_score: f64,
    pub similarity_category: SimilarityCategory,
    pub judge_reasoning: String,
    pub success: bool,
}

/// Aggregate similarity metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EvaluationMetrics {
    pub total_cases: u64,
    pub average_similarity_score: f64,
    pub high_similarity_count: u64,
    pub medium_similarity_count: u64,
    pub low_similarity_count: u64,
    /// `high_similarity_count / total_cases`, 0 when there are no cases.
    pub high_similarity_rate: f64,
}

impl EvaluationMetrics {
    fn with_counts(total_cases: u64, average: f64, high: u64, medium: u64, low: u64) -> Self {
        // Supplied counts may disagree with the supplied total.
        let denominator = total_cases.max(high + medium + low);
        let high_similarity_rate = if denominator == 0 {
            0.0
        } else {
            (high as f64 / denominator as f64).clamp(0.0, 1.0)
        };
        Self {
            total_cases,
            average_similarity_score: finite_or_zero(average),
            high_similarity_count: high,
            medium_similarity_count: medium,
            low_similarity_count: low,
            high_similarity_rate,
        }
    }

    /// Share of cases that were at least `medium`.
    pub fn success_rate(&self) -> f64 {
        let counted =
            self.high_similarity_count + self.medium_similarity_count + self.low_similarity_count;
        let denominator = self.total_cases.max(counted);
        if denominator == 0 {
            0.0
        } else {
            (self.high_similarity_count + self.medium_similarity_count) as f64
                / denominator as f64
        }
    }
}

/// Canonical, display-ready evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub id: String,
    pub status: RemoteStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub dataset_name: Option<String>,
    pub model_name: Option<String>,
    pub judge_model: Option<String>,
    pub similarity_threshold: Option<f64>,
    pub metrics: EvaluationMetrics,
    pub cases: Vec<ComparisonCase>,
}

/// One row of the remote evaluation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub id: String,
    pub status: RemoteStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub dataset_name: Option<String>,
    pub model_name: Option<String>,
    pub total_cases: u64,
    pub metrics: Option<EvaluationMetrics>,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Status carried by a details payload, if any.
pub fn remote_status(details: &RawPayload) -> Option<RemoteStatus> {
    details.string(FIELD_STATUS).map(|s| RemoteStatus::parse(&s))
}

/// Non-empty `error` string of a response, signaling a logical rejection.
pub fn logical_error(response: &Value) -> Option<String> {
    response
        .get(ENVELOPE_ERROR)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn envelope_object(response: &Value, key: &str) -> Result<RawPayload> {
    if let Some(message) = logical_error(response) {
        return Err(OrchestratorError::Logical(message));
    }
    response
        .get(key)
        .cloned()
        .and_then(RawPayload::from_value)
        .ok_or_else(|| OrchestratorError::remote(format!("Response is missing '{}'", key)))
}

fn envelope_list(response: &Value, key: &str) -> Result<Vec<RawPayload>> {
    if let Some(message) = logical_error(response) {
        return Err(OrchestratorError::Logical(message));
    }
    let items = response
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| OrchestratorError::remote(format!("Response is missing '{}'", key)))?;
    Ok(items
        .iter()
        .cloned()
        .filter_map(RawPayload::from_value)
        .collect())
}

/// Unwrap a `get_evaluation_details` response (`{ evaluation, status }`).
pub fn details_envelope(response: &Value) -> Result<RawPayload> {
    envelope_object(response, ENVELOPE_EVALUATION)
}

/// Unwrap a `get_evaluation_cases` response (`{ evaluation_id, total_cases, cases }`).
pub fn cases_envelope(response: &Value) -> Result<Vec<RawPayload>> {
    envelope_list(response, ENVELOPE_CASES)
}

/// Unwrap a `list_evaluations` response (`{ evaluations }`).
pub fn summaries_envelope(response: &Value) -> Result<Vec<RawPayload>> {
    envelope_list(response, ENVELOPE_EVALUATIONS)
}

/// Normalize one raw comparison case.
pub fn normalize_case(raw: &RawPayload) -> ComparisonCase {
    let score = finite_or_zero(raw.number(FIELD_CASE_SCORE).unwrap_or(0.0)).clamp(0.0, 100.0);
    let category = SimilarityCategory::from_score(score);

    if let Some(supplied) = raw.string(FIELD_CASE_CATEGORY) {
        if !supplied.eq_ignore_ascii_case(category.as_str()) {
            debug!(
                supplied = %supplied,
                derived = %category,
                score,
                "overriding similarity category that disagrees with score"
            );
        }
    }

    ComparisonCase {
        case_id: raw.string(FIELD_CASE_ID).unwrap_or_default(),
        original_query: raw.string(FIELD_CASE_QUERY).unwrap_or_default(),
        expected_response: raw.string(FIELD_CASE_EXPECTED).unwrap_or_default(),
        model_response: raw.string(FIELD_CASE_RESPONSE).unwrap_or_default(),
        similarity_score: score,
        similarity_category: category,
        judge_reasoning: raw.string(FIELD_CASE_REASONING).unwrap_or_default(),
        success: raw.boolean(FIELD_CASE_SUCCESS).unwrap_or(false),
    }
}

/// Metrics from supplied aggregates, falling back to the cases themselves.
fn reconcile_metrics(source: &RawPayload, cases: &[ComparisonCase]) -> EvaluationMetrics {
    let total = source
        .count(FIELD_TOTAL_CASES)
        .unwrap_or(cases.len() as u64);

    let supplied = [
        source.count(FIELD_HIGH_COUNT),
        source.count(FIELD_MEDIUM_COUNT),
        source.count(FIELD_LOW_COUNT),
    ];
    let (high, medium, low) = if supplied.iter().any(Option::is_some) {
        let [high, medium, low] = supplied.map(|c| c.unwrap_or(0));
        (high, medium, low)
    } else {
        let bucket = |category: SimilarityCategory| {
            cases
                .iter()
                .filter(|c| c.similarity_category == category)
                .count() as u64
        };
        (
            bucket(SimilarityCategory::High),
            bucket(SimilarityCategory::Medium),
            bucket(SimilarityCategory::Low),
        )
    };

    let average = source.number(FIELD_AVERAGE).unwrap_or_else(|| {
        if cases.is_empty() {
            0.0
        } else {
            cases.iter().map(|c| c.similarity_score).sum::<f64>() / cases.len() as f64
        }
    });

    EvaluationMetrics::with_counts(total, average, high, medium, low)
}

/// Build the canonical result from a details payload and a case list.
///
/// An empty `raw_cases` falls back to cases embedded in the details.
pub fn normalize(details: &RawPayload, raw_cases: &[RawPayload]) -> EvaluationResult {
    let cases: Vec<ComparisonCase> = if raw_cases.is_empty() {
        details
            .list(FIELD_CASES)
            .into_iter()
            .filter_map(RawPayload::from_value)
            .map(|raw| normalize_case(&raw))
            .collect()
    } else {
        raw_cases.iter().map(normalize_case).collect()
    };

    let metrics = reconcile_metrics(details, &cases);

    EvaluationResult {
        id: details.string(FIELD_ID).unwrap_or_default(),
        // Details are only written once the comparison step has run.
        status: remote_status(details).unwrap_or(RemoteStatus::Completed),
        started_at: details.string(FIELD_STARTED_AT),
        completed_at: details.string(FIELD_COMPLETED_AT),
        dataset_name: details.string(FIELD_DATASET_NAME),
        model_name: details.string(FIELD_MODEL_NAME),
        judge_model: details.string(FIELD_JUDGE_MODEL),
        similarity_threshold: details.number(FIELD_THRESHOLD),
        metrics,
        cases,
    }
}

/// Normalize one entry of the remote evaluation list.
pub fn normalize_summary(raw: &RawPayload) -> EvaluationSummary {
    let total_cases = raw.count(FIELD_TOTAL_CASES).unwrap_or(0);
    let metrics = raw
        .nested(FIELD_NESTED_METRICS)
        .map(|nested| reconcile_metrics(&nested, &[]))
        .or_else(|| {
            let has_flat = raw.get(FIELD_AVERAGE).is_some() || raw.get(FIELD_HIGH_COUNT).is_some();
            has_flat.then(|| reconcile_metrics(raw, &[]))
        });

    EvaluationSummary {
        id: raw.string(FIELD_ID).unwrap_or_default(),
        status: remote_status(raw).unwrap_or(RemoteStatus::Unknown),
        started_at: raw.string(FIELD_STARTED_AT),
        completed_at: raw.string(FIELD_COMPLETED_AT),
        dataset_name: raw.string(FIELD_DATASET_NAME),
        model_name: raw.string(FIELD_MODEL_NAME),
        total_cases: metrics.as_ref().map_or(total_cases, |m| m.total_cases.max(total_cases)),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawPayload {
        RawPayload::from_value(value).unwrap()
    }

    fn case(id: &str, score: f64) -> RawPayload {
        raw(json!({
            "case_id": id,
            "original_query": "q",
            "expected_response": "e",
            "model_response": "m",
            "similarity_score": score,
            "judge_reasoning": "r",
            "success": true,
        }))
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(SimilarityCategory::from_score(80.0), SimilarityCategory::High);
        assert_eq!(SimilarityCategory::from_score(79.0), SimilarityCategory::Medium);
        assert_eq!(SimilarityCategory::from_score(50.0), SimilarityCategory::Medium);
        assert_eq!(SimilarityCategory::from_score(49.0), SimilarityCategory::Low);
        assert_eq!(SimilarityCategory::from_score(0.0), SimilarityCategory::Low);
    }

    #[test]
    fn test_cases_without_category_are_bucketed() {
        let result = normalize(
            &raw(json!({"evaluation_id": "eval_1"})),
            &[case("a", 79.0), case("b", 80.0), case("c", 49.0)],
        );

        let categories: Vec<_> = result.cases.iter().map(|c| c.similarity_category).collect();
        assert_eq!(
            categories,
            vec![
                SimilarityCategory::Medium,
                SimilarityCategory::High,
                SimilarityCategory::Low
            ]
        );
    }

    #[test]
    fn test_zero_cases_has_zero_rate() {
        let result = normalize(&raw(json!({"total_cases": 0, "high_similarity_count": 0})), &[]);
        assert_eq!(result.metrics.total_cases, 0);
        assert_eq!(result.metrics.high_similarity_rate, 0.0);
        assert!(!result.metrics.high_similarity_rate.is_nan());
        assert_eq!(result.metrics.success_rate(), 0.0);
    }

    #[test]
    fn test_counts_derived_from_cases() {
        let result = normalize(
            &raw(json!({"evaluation_id": "eval_1", "status": "comparison_completed"})),
            &[case("a", 95.0), case("b", 85.0), case("c", 60.0), case("d", 10.0)],
        );

        let m = &result.metrics;
        assert_eq!(m.total_cases, 4);
        assert_eq!(m.high_similarity_count, 2);
        assert_eq!(m.medium_similarity_count, 1);
        assert_eq!(m.low_similarity_count, 1);
        assert_eq!(m.high_similarity_rate, 0.5);
        assert_eq!(m.average_similarity_score, 62.5);
        assert_eq!(result.status, RemoteStatus::ComparisonCompleted);
    }

    #[test]
    fn test_precomputed_counts_win_and_rate_is_recomputed() {
        // The judge reports the rate as a percentage; it is always recomputed.
        let details = raw(json!({
            "evaluation_id": "eval_2",
            "total_cases": 10,
            "high_similarity_count": 7,
            "medium_similarity_count": 2,
            "low_similarity_count": 1,
            "average_similarity_score": 81.5,
            "high_similarity_rate": 70.0,
            "similarity_threshold": 80,
            "judge_model": "gpt-4o-mini",
        }));
        let result = normalize(&details, &[]);

        assert_eq!(result.metrics.high_similarity_count, 7);
        assert_eq!(result.metrics.high_similarity_rate, 0.7);
        assert_eq!(result.metrics.average_similarity_score, 81.5);
        assert_eq!(result.similarity_threshold, Some(80.0));
        assert_eq!(result.judge_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(result.status, RemoteStatus::Completed);
    }

    #[test]
    fn test_rates_stay_within_unit_range_when_counts_exceed_total() {
        let details = raw(json!({
            "total_cases": 2,
            "high_similarity_count": 4,
            "medium_similarity_count": 1,
            "low_similarity_count": 0,
        }));
        let metrics = normalize(&details, &[]).metrics;

        assert_eq!(metrics.total_cases, 2);
        assert_eq!(metrics.high_similarity_rate, 0.8);
        assert_eq!(metrics.success_rate(), 1.0);
    }

    #[test]
    fn test_camel_case_fields_accepted() {
        let details = raw(json!({
            "id": "eval_3",
            "totalCases": 2,
            "highSimilarityCount": 1,
            "judgeModel": "claude-3-5-haiku-latest",
            "comparison_results": [
                {"caseId": "x", "originalQuery": "hi", "similarityScore": 90, "success": true},
                {"caseId": "y", "similarityScore": "55.5"}
            ]
        }));
        let result = normalize(&details, &[]);

        assert_eq!(result.id, "eval_3");
        assert_eq!(result.cases.len(), 2);
        assert_eq!(result.cases[0].case_id, "x");
        assert_eq!(result.cases[0].original_query, "hi");
        assert_eq!(result.cases[1].similarity_score, 55.5);
        assert_eq!(result.cases[1].similarity_category, SimilarityCategory::Medium);
        assert!(!result.cases[1].success);
        assert_eq!(result.metrics.high_similarity_rate, 0.5);
        assert_eq!(result.judge_model.as_deref(), Some("claude-3-5-haiku-latest"));
    }

    #[test]
    fn test_supplied_category_cannot_contradict_score() {
        let mut raw_case = case("a", 30.0);
        raw_case
            .0
            .insert("similarity_category".to_string(), json!("high"));
        let normalized = normalize_case(&raw_case);
        assert_eq!(normalized.similarity_category, SimilarityCategory::Low);

        let errored = normalize_case(&raw(json!({"case_id": "e", "similarity_category": "error"})));
        assert_eq!(errored.similarity_score, 0.0);
        assert_eq!(errored.similarity_category, SimilarityCategory::Low);
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        assert_eq!(normalize_case(&case("a", 140.0)).similarity_score, 100.0);
        assert_eq!(normalize_case(&case("b", -3.0)).similarity_score, 0.0);
    }

    #[test]
    fn test_summary_with_nested_results() {
        let summary = normalize_summary(&raw(json!({
            "id": "eval_4",
            "status": "comparison_completed",
            "startedAt": "2025-01-01T00:00:00",
            "total_cases": 4,
            "results": {
                "totalCases": 4,
                "averageSimilarityScore": 70.0,
                "highSimilarityCount": 1,
                "mediumSimilarityCount": 2,
                "lowSimilarityCount": 1,
                "highSimilarityRate": 0.25
            }
        })));

        assert_eq!(summary.status, RemoteStatus::ComparisonCompleted);
        assert_eq!(summary.started_at.as_deref(), Some("2025-01-01T00:00:00"));
        let metrics = summary.metrics.unwrap();
        assert_eq!(metrics.high_similarity_rate, 0.25);
        assert_eq!(metrics.success_rate(), 0.75);
    }

    #[test]
    fn test_summary_without_metrics() {
        let summary = normalize_summary(&raw(json!({"id": "eval_5", "status": "dataset_loaded"})));
        assert_eq!(summary.status, RemoteStatus::DatasetLoaded);
        assert!(!summary.status.is_terminal());
        assert!(summary.metrics.is_none());
        assert_eq!(summary.total_cases, 0);
    }

    #[test]
    fn test_status_vocabulary() {
        assert!(RemoteStatus::parse("completed").is_success());
        assert!(RemoteStatus::parse("Comparison_Completed").is_success());
        assert!(RemoteStatus::parse("failed").is_failure());
        assert!(!RemoteStatus::parse("execution_completed").is_terminal());
        assert_eq!(RemoteStatus::parse("queued"), RemoteStatus::Other("queued".to_string()));
    }

    #[test]
    fn test_envelopes() {
        let details = details_envelope(&json!({
            "evaluation": {"evaluation_id": "eval_6", "status": "running"},
            "status": "success"
        }))
        .unwrap();
        assert_eq!(remote_status(&details), Some(RemoteStatus::Running));

        let err = details_envelope(&json!({"error": "Evaluation details not found", "status": "error"}))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Logical(_)));

        let cases = cases_envelope(&json!({"evaluation_id": "eval_6", "total_cases": 1, "cases": [{"case_id": "a"}]}))
            .unwrap();
        assert_eq!(cases.len(), 1);

        assert!(summaries_envelope(&json!({})).is_err());
        assert_eq!(logical_error(&json!({"error": "  "})), None);
    }
}
