// Port for fetching rows from user-configured analytics APIs
use crate::domain::row::Row;
use crate::domain::widget::DataRequest;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Invalid API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("API returned HTTP {status}")]
    HttpError { status: u16 },

    #[error("Filter parameters are incompatible with the query: {message}")]
    IncompatibleParameters { message: String },

    #[error("API response is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("API response has no recognizable row array")]
    UnrecognizedShape,

    #[error("Query job {job_id} is still running")]
    JobPending { job_id: String },

    #[error("Query job failed: {reason}")]
    JobFailed { reason: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Transient failures worth another attempt with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::InvalidBody(_) => true,
            Self::HttpError { status } => *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, request: &DataRequest) -> Result<Vec<Row>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::HttpError { status: 502 }.is_transient());
        assert!(!FetchError::HttpError { status: 404 }.is_transient());
        assert!(!FetchError::UnrecognizedShape.is_transient());
        assert!(!FetchError::JobFailed { reason: "x".into() }.is_transient());
    }
}
