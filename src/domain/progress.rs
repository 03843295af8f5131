//! Progress notifications pushed to job owners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{Job, JobStatus};

/// Snapshot of a job's status sent to its owner after each transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            error: job.error.clone(),
            timestamp: Utc::now(),
        }
    }
}
