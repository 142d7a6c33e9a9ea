//! Error types for bulk jobs

use crate::error::AppError;
use crate::search::SearchError;

/// Result type for bulk job operations
pub type JobResult<T> = std::result::Result<T, JobError>;

/// Why a bulk job stopped before its query ran dry
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    /// A search or bulk request failed; the job does not retry
    #[error(transparent)]
    Search(#[from] SearchError),

    /// The query kept matching after the configured number of rounds
    #[error("Job still matching documents after {iterations} iterations")]
    IterationCapExceeded { iterations: u32 },

    /// A whole batch failed on documents that still exist, so the next search
    /// would return the same documents
    #[error("No document in batch {iteration} could be mutated ({failed} failed)")]
    Stalled { iteration: u32, failed: u64 },
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Search(e) => e.into(),
            JobError::IterationCapExceeded { .. } | JobError::Stalled { .. } => {
                AppError::Job(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::TransportError;

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = JobError::IterationCapExceeded { iterations: 3 }.into();
        assert_eq!(err.error_code(), "JOB_ERROR");
        assert!(err.to_string().contains("3 iterations"));

        let err: AppError = JobError::Search(SearchError::Transport(TransportError::unreachable(
            "connection refused",
        )))
        .into();
        assert_eq!(err.error_code(), "NO_RESPONSE");
    }
}
