//! Pipeline error taxonomy.

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use uuid::Uuid;

use super::job_store::StoreError;
use super::segmenter::SegmentError;

/// Reasons a job can fail.
///
/// The `Display` text is what ends up in the job's `error` field.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Transcription failed: {0}")]
    TranscriptionFailure(String),

    #[error("Question generation failed for segment {index}: {message}")]
    SegmentGenerationFailure { index: u32, message: String },

    #[error("Question generation failed for all {count} segments: {first_error}")]
    AllSegmentsFailed { count: usize, first_error: String },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    #[error(transparent)]
    Segmentation(#[from] SegmentError),

    #[error("Pipeline aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn timeout(stage: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            stage: stage.into(),
            after,
        }
    }
}

/// Describe a task that did not run to completion
pub(crate) fn task_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("panicked: {}", message)
}
