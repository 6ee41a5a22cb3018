// Normalization of the response envelopes analytics APIs return
use crate::application::data_source::FetchError;
use crate::domain::row::Row;
use serde_json::Value;

type Extractor = fn(&Value) -> Option<Vec<Row>>;

/// Candidate row locations, tried in order.
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("array", |body| rows_at(body, &[])),
    ("data", |body| rows_at(body, &["data"])),
    ("rows", |body| rows_at(body, &["rows"])),
    ("results", |body| rows_at(body, &["results"])),
    ("query_result", |body| rows_at(body, &["query_result", "data", "rows"])),
];

fn rows_at(body: &Value, path: &[&str]) -> Option<Vec<Row>> {
    let mut current = body;
    for segment in path {
        current = current.get(segment)?;
    }
    let items = current.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
    )
}

fn extract(body: &Value) -> Option<Vec<Row>> {
    EXTRACTORS.iter().find_map(|(name, extractor)| {
        let rows = extractor(body)?;
        tracing::debug!("Matched {} envelope with {} rows", name, rows.len());
        Some(rows)
    })
}

#[derive(Debug, PartialEq)]
enum JobStatus {
    Complete,
    Failed,
    Pending,
}

fn job_status(job: &Value) -> JobStatus {
    match job.get("status") {
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "complete" | "completed" | "success" | "succeeded" | "done" => JobStatus::Complete,
            "failed" | "failure" | "error" | "cancelled" | "canceled" => JobStatus::Failed,
            _ => JobStatus::Pending,
        },
        Some(Value::Number(n)) => match n.as_u64() {
            Some(3) => JobStatus::Complete,
            Some(4) | Some(5) => JobStatus::Failed,
            _ => JobStatus::Pending,
        },
        _ => JobStatus::Pending,
    }
}

fn normalize_job(job: &Value) -> Result<Vec<Row>, FetchError> {
    match job_status(job) {
        JobStatus::Complete => extract(job)
            .or_else(|| job.get("result").and_then(extract))
            .ok_or(FetchError::UnrecognizedShape),
        JobStatus::Failed => Err(FetchError::JobFailed {
            reason: job
                .get("error")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("query job failed")
                .to_string(),
        }),
        JobStatus::Pending => Err(FetchError::JobPending {
            job_id: job
                .get("id")
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default(),
        }),
    }
}

/// Flatten any supported envelope into rows.
pub fn normalize(body: &Value) -> Result<Vec<Row>, FetchError> {
    if let Some(job) = body.get("job").filter(|j| j.is_object()) {
        return normalize_job(job);
    }
    extract(body).ok_or(FetchError::UnrecognizedShape)
}

/// A targeted message when an error body says the filters do not fit the query.
pub fn incompatible_parameters(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let message = ["message", "error", "detail"]
        .iter()
        .find_map(|key| parsed.get(key).and_then(Value::as_str))?;
    let lower = message.to_ascii_lowercase();
    (lower.contains("incompatible") && lower.contains("parameter")).then(|| message.to_string())
}
